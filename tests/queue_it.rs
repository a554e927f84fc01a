use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use net_qsim::simulation::config;
use net_qsim::simulation::events::{EventsManager, LinkEnterEvent, LinkLeaveEvent};
use net_qsim::simulation::id::Id;
use net_qsim::simulation::network::sim_network::SimNetwork;
use net_qsim::simulation::network::{LinkAttributes, Network};
use net_qsim::test_utils::{create_vehicle, EventRecorder};

// 0 -l0-> 1 -l1-> 2. l0 holds two vehicles (100m, one lane, 50m per vehicle), l1 takes everything.
fn network() -> Arc<Network> {
    let mut network = Network::with_effective_cell_size(50.);
    let n0 = network.add_node("0", 0., 0.).unwrap();
    let n1 = network.add_node("1", 100., 0.).unwrap();
    let n2 = network.add_node("2", 200., 0.).unwrap();
    network
        .add_link("l0", n0, n1, LinkAttributes::new(100., 3600., 10., 1.))
        .unwrap();
    network
        .add_link(
            "l1",
            n1,
            n2,
            LinkAttributes::new(100., 3600., 10., 1.).with_storage_capacity(100.),
        )
        .unwrap();
    Arc::new(network)
}

#[test]
fn storage_and_flow_capacity_of_single_link() {
    let network = network();
    let mut sim = SimNetwork::new(network, &config::Simulation::default());
    assert_eq!(2., sim.link(Id::new(0)).storage_capacity());

    let mut events = EventsManager::new();
    let enter = Rc::new(RefCell::new(Vec::new()));
    let leave = Rc::new(RefCell::new(Vec::new()));
    let enter_clone = enter.clone();
    events.on::<LinkEnterEvent, _>(move |e| {
        if e.link == Id::new(0) {
            enter_clone.borrow_mut().push((e.time, e.vehicle.internal()));
        }
    });
    let leave_clone = leave.clone();
    events.on::<LinkLeaveEvent, _>(move |e| {
        if e.link == Id::new(0) {
            leave_clone.borrow_mut().push((e.time, e.vehicle.internal()));
        }
    });

    for i in 0..4 {
        sim.insert_vehicle(create_vehicle(i, &[0, 1]), 0).unwrap();
    }

    let mut snapshots = vec![];
    let mut arrivals = vec![];
    for now in 0..40 {
        let result = sim.step(now, &mut events).unwrap();
        arrivals.extend(result.arrived.iter().map(|v| (now, v.id.internal())));

        let link = sim.link(Id::new(0));
        assert!(link.occupancy() <= link.storage_capacity());
        if (2..12).contains(&now) {
            // two vehicles on the link, the others wait upstream
            assert_eq!(2, link.waiting_len());
        }
        snapshots.push((now, link.queue_len(), link.buffer_len()));
    }

    // one vehicle per second, 10s travel time. The third vehicle enters when the first two have
    // left, storage is released with a delay of one time step.
    assert_eq!(vec![(0, 0), (1, 1), (12, 2), (13, 3)], *enter.borrow());
    // (time, in queue, in buffer) after each time step
    assert_eq!((9, 2, 0), snapshots[9]);
    assert_eq!((10, 1, 1), snapshots[10]);
    assert_eq!((11, 0, 1), snapshots[11]);
    assert_eq!((12, 1, 0), snapshots[12]);
    assert_eq!((21, 2, 0), snapshots[21]);
    assert_eq!((22, 1, 1), snapshots[22]);
    assert_eq!((23, 0, 1), snapshots[23]);
    assert_eq!((24, 0, 0), snapshots[24]);
    assert_eq!(vec![(11, 0), (12, 1), (23, 2), (24, 3)], *leave.borrow());
    assert_eq!(vec![(21, 0), (22, 1), (33, 2), (34, 3)], arrivals);
    assert!(sim.is_empty());
}

#[test]
fn departures_are_flow_capacity_spaced() {
    // 900 veh/h: one vehicle every 4 seconds, no matter how many want to depart
    let mut network = Network::new();
    let n0 = network.add_node("0", 0., 0.).unwrap();
    let n1 = network.add_node("1", 100., 0.).unwrap();
    network
        .add_link("l0", n0, n1, LinkAttributes::new(1000., 900., 10., 3.))
        .unwrap();
    let mut sim = SimNetwork::new(Arc::new(network), &config::Simulation::default());

    let mut events = EventsManager::new();
    let recorder = EventRecorder::new();
    recorder.register(&mut events);
    for i in 0..5 {
        sim.insert_vehicle(create_vehicle(i, &[0]), 0).unwrap();
    }
    for now in 0..200 {
        sim.step(now, &mut events).unwrap();
    }

    let enter_times: Vec<u32> = recorder
        .lines()
        .iter()
        .filter(|l| l.contains("entered link"))
        .map(|l| l.split(' ').next().unwrap().parse().unwrap())
        .collect();
    assert_eq!(vec![0, 4, 8, 12, 16], enter_times);
    assert_eq!(
        vec![
            "100 left link link=#0 vehicle=#0",
            "100 vehicle leaves traffic link=#0 vehicle=#0 mode=car"
        ],
        recorder.at(100)
    );
    assert!(sim.is_empty());
}
