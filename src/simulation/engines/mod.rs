pub mod multi_modal_engine;
