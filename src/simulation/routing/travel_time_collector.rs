use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use ahash::AHashMap;
use nohash_hasher::{IntMap, IntSet};
use tracing::debug;

use crate::simulation::events::{
    EventsManager, LinkEnterEvent, LinkLeaveEvent, VehicleEntersTrafficEvent,
    VehicleLeavesTrafficEvent,
};
use crate::simulation::id::Id;
use crate::simulation::network::Link;
use crate::simulation::routing::travel_costs::{LinkToLinkTravelTime, TravelTime};
use crate::simulation::vehicles::{Driver, InternalVehicle, InternalVehicleType};

#[derive(Debug, Default, Clone, Copy)]
struct Sample {
    sum: f64,
    count: u32,
}

impl Sample {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn average(&self) -> f64 {
        self.sum / self.count as f64
    }
}

type Bins = BTreeMap<u32, Sample>;

/// Collects realized travel times from link events. Travel times are binned by the time a vehicle
/// entered a link. Besides plain link travel times, the collector keeps travel times per turn, i.e.
/// for a link followed by a specific next link.
///
/// With a mode set, vehicles of other modes are ignored from the moment they enter traffic.
#[derive(Debug)]
pub struct TravelTimeCollector {
    bin_size: u32,
    mode: Option<String>,
    ignored: IntSet<Id<InternalVehicle>>,
    link_times: IntMap<Id<Link>, Bins>,
    turn_times: AHashMap<(Id<Link>, Id<Link>), Bins>,
    // vehicles currently on a link with the link and their enter time
    entered: IntMap<Id<InternalVehicle>, (Id<Link>, u32)>,
    // vehicles which just left a link: link, enter time, leave time
    left: IntMap<Id<InternalVehicle>, (Id<Link>, u32, u32)>,
}

impl TravelTimeCollector {
    pub fn new(bin_size: u32, mode: Option<&str>) -> Self {
        TravelTimeCollector {
            bin_size: bin_size.max(1),
            mode: mode.map(String::from),
            ignored: IntSet::default(),
            link_times: IntMap::default(),
            turn_times: AHashMap::new(),
            entered: IntMap::default(),
            left: IntMap::default(),
        }
    }

    /// Creates a collector for all vehicles and subscribes it to the link and vehicle events of
    /// `events`.
    pub fn register(events: &mut EventsManager, bin_size: u32) -> Rc<RefCell<TravelTimeCollector>> {
        Self::subscribe(events, TravelTimeCollector::new(bin_size, None))
    }

    /// Like [TravelTimeCollector::register], but only for vehicles of `mode`.
    pub fn register_for_mode(
        events: &mut EventsManager,
        bin_size: u32,
        mode: &str,
    ) -> Rc<RefCell<TravelTimeCollector>> {
        Self::subscribe(events, TravelTimeCollector::new(bin_size, Some(mode)))
    }

    fn subscribe(events: &mut EventsManager, collector: TravelTimeCollector) -> Rc<RefCell<TravelTimeCollector>> {
        let collector = Rc::new(RefCell::new(collector));

        let c = collector.clone();
        events.on::<VehicleEntersTrafficEvent, _>(move |e| {
            c.borrow_mut().process_vehicle_enters_traffic(e)
        });
        let c = collector.clone();
        events.on::<LinkEnterEvent, _>(move |e| c.borrow_mut().process_link_enter(e));
        let c = collector.clone();
        events.on::<LinkLeaveEvent, _>(move |e| c.borrow_mut().process_link_leave(e));
        let c = collector.clone();
        events.on::<VehicleLeavesTrafficEvent, _>(move |e| {
            c.borrow_mut().process_vehicle_leaves_traffic(e)
        });

        collector
    }

    fn bin(&self, time: u32) -> u32 {
        time / self.bin_size
    }

    fn process_vehicle_enters_traffic(&mut self, event: &VehicleEntersTrafficEvent) {
        if self.mode.as_ref().is_some_and(|m| *m != event.mode) {
            self.ignored.insert(event.vehicle);
        }
    }

    fn process_link_enter(&mut self, event: &LinkEnterEvent) {
        if self.ignored.contains(&event.vehicle) {
            return;
        }
        if let Some((from, enter, leave)) = self.left.remove(&event.vehicle) {
            let bin = self.bin(enter);
            self.turn_times
                .entry((from, event.link))
                .or_default()
                .entry(bin)
                .or_default()
                .add(leave.saturating_sub(enter) as f64);
        }
        self.entered.insert(event.vehicle, (event.link, event.time));
    }

    fn process_link_leave(&mut self, event: &LinkLeaveEvent) {
        if self.ignored.contains(&event.vehicle) {
            return;
        }
        // Without a matching enter event the vehicle was on the link before the collector was
        // registered.
        let Some((link, enter)) = self.entered.remove(&event.vehicle) else {
            return;
        };
        if link != event.link {
            debug!(
                "Vehicle {} leaves link {} but entered link {link}. Discarding travel time.",
                event.vehicle, event.link
            );
            return;
        }
        let bin = self.bin(enter);
        self.link_times
            .entry(link)
            .or_default()
            .entry(bin)
            .or_default()
            .add(event.time.saturating_sub(enter) as f64);
        self.left.insert(event.vehicle, (link, enter, event.time));
    }

    fn process_vehicle_leaves_traffic(&mut self, event: &VehicleLeavesTrafficEvent) {
        self.ignored.remove(&event.vehicle);
        self.entered.remove(&event.vehicle);
        self.left.remove(&event.vehicle);
    }

    /// Average travel time of vehicles which entered `link` in the time bin of `time`.
    pub fn average_travel_time(&self, link: Id<Link>, time: u32) -> Option<f64> {
        self.link_times
            .get(&link)?
            .get(&self.bin(time))
            .map(Sample::average)
    }

    /// Average travel time of vehicles which entered `from` in the time bin of `time` and continued on `to`.
    pub fn average_turn_travel_time(&self, from: Id<Link>, to: Id<Link>, time: u32) -> Option<f64> {
        self.turn_times
            .get(&(from, to))?
            .get(&self.bin(time))
            .map(Sample::average)
    }

    /// Vehicles which are on a link and were not yet accounted for.
    pub fn vehicles_in_flight(&self) -> usize {
        self.entered.len()
    }

    /// Freezes the collected averages into a travel time provider.
    pub fn travel_times(&self) -> CollectedTravelTimes {
        let averages = |bins: &Bins| {
            bins.iter()
                .map(|(bin, sample)| (*bin, sample.average()))
                .collect::<BTreeMap<_, _>>()
        };
        CollectedTravelTimes {
            bin_size: self.bin_size,
            link_times: self
                .link_times
                .iter()
                .map(|(link, bins)| (*link, averages(bins)))
                .collect(),
            turn_times: self
                .turn_times
                .iter()
                .map(|(turn, bins)| (*turn, averages(bins)))
                .collect(),
        }
    }
}

/// Travel times observed in a simulation run. Links and time bins without observations fall back
/// to free speed travel times.
#[derive(Debug, Clone)]
pub struct CollectedTravelTimes {
    bin_size: u32,
    link_times: IntMap<Id<Link>, BTreeMap<u32, f64>>,
    turn_times: AHashMap<(Id<Link>, Id<Link>), BTreeMap<u32, f64>>,
}

impl CollectedTravelTimes {
    fn bin(&self, time: f64) -> u32 {
        time.max(0.) as u32 / self.bin_size
    }

    fn observed(&self, link: Id<Link>, time: f64) -> Option<f64> {
        self.link_times.get(&link)?.get(&self.bin(time)).copied()
    }

    pub fn observed_links(&self) -> usize {
        self.link_times.len()
    }
}

impl TravelTime for CollectedTravelTimes {
    fn link_travel_time(
        &self,
        link: &Link,
        time: f64,
        _driver: Option<Id<Driver>>,
        vehicle_type: Option<&InternalVehicleType>,
    ) -> f64 {
        self.observed(link.id, time)
            .unwrap_or_else(|| link.free_speed_travel_time(vehicle_type.map(|t| t.max_v)))
    }

    fn into_link_to_link(self: Arc<Self>) -> Option<Arc<dyn LinkToLinkTravelTime>> {
        Some(self)
    }
}

impl LinkToLinkTravelTime for CollectedTravelTimes {
    fn link_to_link_travel_time(
        &self,
        from: &Link,
        to: &Link,
        time: f64,
        _driver: Option<Id<Driver>>,
        vehicle_type: Option<&InternalVehicleType>,
    ) -> f64 {
        let bin = self.bin(time);
        self.turn_times
            .get(&(from.id, to.id))
            .and_then(|bins| bins.get(&bin).copied())
            .or_else(|| self.observed(from.id, time))
            .unwrap_or_else(|| from.free_speed_travel_time(vehicle_type.map(|t| t.max_v)))
    }
}
