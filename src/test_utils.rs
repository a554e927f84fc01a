use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::simulation::config::Config;
use crate::simulation::events::{
    EventTrait, EventsManager, LinkEnterEvent, LinkLeaveEvent, VehicleEntersTrafficEvent,
    VehicleLeavesTrafficEvent,
};
use crate::simulation::id::Id;
use crate::simulation::network::{LinkAttributes, Network};
use crate::simulation::routing::Route;
use crate::simulation::vehicles::{InternalVehicle, InternalVehicleType};

/// Nodes `0..=n` on a line, connected by links `0..n` with the given attributes.
pub fn line_network(links: &[LinkAttributes]) -> Network {
    let mut network = Network::new();
    let mut from = network.add_node("0", 0., 0.).unwrap();
    let mut x = 0.;
    for (i, attributes) in links.iter().enumerate() {
        x += attributes.length;
        let to = network.add_node(&(i + 1).to_string(), x, 0.).unwrap();
        network
            .add_link(&i.to_string(), from, to, attributes.clone())
            .unwrap();
        from = to;
    }
    network
}

pub fn vehicle_type(mode: &str, max_v: f32, pce: f32) -> Arc<InternalVehicleType> {
    Arc::new(InternalVehicleType::new(mode, mode, max_v, pce))
}

/// Car with id and driver id `id` and a fixed route over the links with the given internal ids.
pub fn create_vehicle(id: u32, links: &[u32]) -> InternalVehicle {
    create_vehicle_of_type(id, links, vehicle_type("car", 50., 1.))
}

pub fn create_vehicle_of_type(
    id: u32,
    links: &[u32],
    vehicle_type: Arc<InternalVehicleType>,
) -> InternalVehicle {
    let route = Route::new(links.iter().map(|l| Id::new(*l)).collect(), 0., 0.);
    InternalVehicle::new(Id::new(id), Id::new(id), vehicle_type, route)
}

pub fn config(end_time: u32) -> Config {
    let mut config = Config::default();
    config.simulation.end_time = end_time;
    config
}

/// Records all events as lines of text, e.g. `12 entered link link=#1 vehicle=#0`.
#[derive(Debug, Default, Clone)]
pub struct EventRecorder {
    lines: Rc<RefCell<Vec<String>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        EventRecorder::default()
    }

    /// Appends all events published by `events` to this recorder. Clones of a recorder share their
    /// lines.
    pub fn register(&self, events: &mut EventsManager) {
        let lines = self.lines.clone();
        events.on_any(move |e| lines.borrow_mut().push(Self::format(e)));
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    /// Lines which start with the given time.
    pub fn at(&self, time: u32) -> Vec<String> {
        let prefix = format!("{time} ");
        self.lines
            .borrow()
            .iter()
            .filter(|l| l.starts_with(&prefix))
            .cloned()
            .collect()
    }

    fn format(event: &dyn EventTrait) -> String {
        let any = event.as_any();
        let details = if let Some(e) = any.downcast_ref::<LinkEnterEvent>() {
            format!("link={} vehicle={}", e.link, e.vehicle)
        } else if let Some(e) = any.downcast_ref::<LinkLeaveEvent>() {
            format!("link={} vehicle={}", e.link, e.vehicle)
        } else if let Some(e) = any.downcast_ref::<VehicleEntersTrafficEvent>() {
            format!("link={} vehicle={} mode={}", e.link, e.vehicle, e.mode)
        } else if let Some(e) = any.downcast_ref::<VehicleLeavesTrafficEvent>() {
            format!("link={} vehicle={} mode={}", e.link, e.vehicle, e.mode)
        } else {
            format!("{event:?}")
        };
        format!("{} {} {}", event.time(), event.type_(), details)
    }
}
