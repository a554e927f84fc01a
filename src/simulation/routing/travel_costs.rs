use std::sync::Arc;

use crate::simulation::id::Id;
use crate::simulation::network::Link;
use crate::simulation::vehicles::{Driver, InternalVehicleType};

/// Travel time of a link when entering it at `time`.
pub trait TravelTime: Send + Sync {
    fn link_travel_time(
        &self,
        link: &Link,
        time: f64,
        driver: Option<Id<Driver>>,
        vehicle_type: Option<&InternalVehicleType>,
    ) -> f64;

    /// Returns the link to link view of this provider, if it has one. Turn aware routing requires it.
    fn into_link_to_link(self: Arc<Self>) -> Option<Arc<dyn LinkToLinkTravelTime>> {
        None
    }
}

/// Travel time of `from` when entering it at `time` and leaving it towards `to`.
pub trait LinkToLinkTravelTime: Send + Sync {
    fn link_to_link_travel_time(
        &self,
        from: &Link,
        to: &Link,
        time: f64,
        driver: Option<Id<Driver>>,
        vehicle_type: Option<&InternalVehicleType>,
    ) -> f64;
}

/// Generalized cost of traversing a link when entering it at `time`.
pub trait TravelDisutility: Send + Sync {
    fn link_travel_disutility(
        &self,
        link: &Link,
        time: f64,
        driver: Option<Id<Driver>>,
        vehicle_type: Option<&InternalVehicleType>,
    ) -> f64;

    /// Lower bound of [TravelDisutility::link_travel_disutility] over all times, drivers and vehicles.
    fn link_minimum_travel_disutility(&self, link: &Link) -> f64;
}

#[derive(Debug, Default, Clone)]
pub struct FreeSpeedTravelTime;

impl TravelTime for FreeSpeedTravelTime {
    fn link_travel_time(
        &self,
        link: &Link,
        _time: f64,
        _driver: Option<Id<Driver>>,
        vehicle_type: Option<&InternalVehicleType>,
    ) -> f64 {
        link.free_speed_travel_time(vehicle_type.map(|t| t.max_v))
    }

    fn into_link_to_link(self: Arc<Self>) -> Option<Arc<dyn LinkToLinkTravelTime>> {
        Some(self)
    }
}

impl LinkToLinkTravelTime for FreeSpeedTravelTime {
    fn link_to_link_travel_time(
        &self,
        from: &Link,
        _to: &Link,
        time: f64,
        driver: Option<Id<Driver>>,
        vehicle_type: Option<&InternalVehicleType>,
    ) -> f64 {
        self.link_travel_time(from, time, driver, vehicle_type)
    }
}

/// Travel time at free speed as cost.
#[derive(Debug, Default, Clone)]
pub struct FreeSpeedTravelDisutility;

impl TravelDisutility for FreeSpeedTravelDisutility {
    fn link_travel_disutility(
        &self,
        link: &Link,
        _time: f64,
        _driver: Option<Id<Driver>>,
        vehicle_type: Option<&InternalVehicleType>,
    ) -> f64 {
        link.free_speed_travel_time(vehicle_type.map(|t| t.max_v))
    }

    fn link_minimum_travel_disutility(&self, link: &Link) -> f64 {
        link.free_speed_travel_time(None)
    }
}

/// Link length as cost.
#[derive(Debug, Default, Clone)]
pub struct DistanceTravelDisutility;

impl TravelDisutility for DistanceTravelDisutility {
    fn link_travel_disutility(
        &self,
        link: &Link,
        _time: f64,
        _driver: Option<Id<Driver>>,
        _vehicle_type: Option<&InternalVehicleType>,
    ) -> f64 {
        link.length
    }

    fn link_minimum_travel_disutility(&self, link: &Link) -> f64 {
        link.length
    }
}

/// Walking at a constant speed. Serves as travel time and as cost for non network modes.
#[derive(Debug, Clone)]
pub struct WalkTravelDisutility {
    walk_speed: f64,
}

impl WalkTravelDisutility {
    pub fn new(walk_speed: f64) -> Self {
        WalkTravelDisutility { walk_speed }
    }

    fn walk_time(&self, link: &Link) -> f64 {
        link.length / self.walk_speed
    }
}

impl TravelDisutility for WalkTravelDisutility {
    fn link_travel_disutility(
        &self,
        link: &Link,
        _time: f64,
        _driver: Option<Id<Driver>>,
        _vehicle_type: Option<&InternalVehicleType>,
    ) -> f64 {
        self.walk_time(link)
    }

    fn link_minimum_travel_disutility(&self, link: &Link) -> f64 {
        self.walk_time(link)
    }
}

impl TravelTime for WalkTravelDisutility {
    fn link_travel_time(
        &self,
        link: &Link,
        _time: f64,
        _driver: Option<Id<Driver>>,
        _vehicle_type: Option<&InternalVehicleType>,
    ) -> f64 {
        self.walk_time(link)
    }

    fn into_link_to_link(self: Arc<Self>) -> Option<Arc<dyn LinkToLinkTravelTime>> {
        Some(self)
    }
}

impl LinkToLinkTravelTime for WalkTravelDisutility {
    fn link_to_link_travel_time(
        &self,
        from: &Link,
        _to: &Link,
        _time: f64,
        _driver: Option<Id<Driver>>,
        _vehicle_type: Option<&InternalVehicleType>,
    ) -> f64 {
        self.walk_time(from)
    }
}

/// `marginal_cost_of_time * travel_time + marginal_cost_of_distance * length` with travel times
/// from any [TravelTime] provider.
#[derive(Clone)]
pub struct TimeDistanceTravelDisutility {
    travel_time: Arc<dyn TravelTime>,
    marginal_cost_of_time: f64,
    marginal_cost_of_distance: f64,
}

impl TimeDistanceTravelDisutility {
    pub fn new(
        travel_time: Arc<dyn TravelTime>,
        marginal_cost_of_time: f64,
        marginal_cost_of_distance: f64,
    ) -> Self {
        TimeDistanceTravelDisutility {
            travel_time,
            marginal_cost_of_time,
            marginal_cost_of_distance,
        }
    }
}

impl TravelDisutility for TimeDistanceTravelDisutility {
    fn link_travel_disutility(
        &self,
        link: &Link,
        time: f64,
        driver: Option<Id<Driver>>,
        vehicle_type: Option<&InternalVehicleType>,
    ) -> f64 {
        let travel_time = self
            .travel_time
            .link_travel_time(link, time, driver, vehicle_type);
        self.marginal_cost_of_time * travel_time + self.marginal_cost_of_distance * link.length
    }

    fn link_minimum_travel_disutility(&self, link: &Link) -> f64 {
        self.marginal_cost_of_time * link.free_speed_travel_time(None)
            + self.marginal_cost_of_distance * link.length
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_approx_eq::assert_approx_eq;

    use crate::simulation::id::Id;
    use crate::simulation::network::{LinkAttributes, Network};
    use crate::simulation::routing::travel_costs::{
        DistanceTravelDisutility, FreeSpeedTravelDisutility, FreeSpeedTravelTime,
        TimeDistanceTravelDisutility, TravelDisutility, TravelTime, WalkTravelDisutility,
    };
    use crate::simulation::vehicles::InternalVehicleType;

    fn network() -> Network {
        let mut network = Network::new();
        let from = network.add_node("from", 0., 0.).unwrap();
        let to = network.add_node("to", 200., 0.).unwrap();
        network
            .add_link("link", from, to, LinkAttributes::new(200., 1800., 20., 1.))
            .unwrap();
        network
    }

    #[test]
    fn free_speed() {
        let network = network();
        let link = network.get_link(Id::new(0));
        let slow = InternalVehicleType::new("slow", "car", 5., 1.);

        assert_eq!(10., FreeSpeedTravelTime.link_travel_time(link, 0., None, None));
        assert_eq!(40., FreeSpeedTravelTime.link_travel_time(link, 0., None, Some(&slow)));
        assert_eq!(
            40.,
            FreeSpeedTravelDisutility.link_travel_disutility(link, 0., None, Some(&slow))
        );
        assert_eq!(10., FreeSpeedTravelDisutility.link_minimum_travel_disutility(link));
    }

    #[test]
    fn distance_and_walk() {
        let network = network();
        let link = network.get_link(Id::new(0));
        let walk = WalkTravelDisutility::new(2.);

        assert_eq!(200., DistanceTravelDisutility.link_travel_disutility(link, 0., None, None));
        assert_eq!(100., walk.link_travel_disutility(link, 3600., None, None));
        assert_eq!(100., walk.link_travel_time(link, 3600., None, None));
        assert_eq!(100., walk.link_minimum_travel_disutility(link));
    }

    #[test]
    fn time_and_distance() {
        let network = network();
        let link = network.get_link(Id::new(0));
        let disutility = TimeDistanceTravelDisutility::new(Arc::new(FreeSpeedTravelTime), 2., 0.01);

        assert_approx_eq!(22., disutility.link_travel_disutility(link, 0., None, None));
        assert_approx_eq!(22., disutility.link_minimum_travel_disutility(link));
    }

    #[test]
    fn link_to_link_free_speed_respects_vehicle_speed() {
        let network = network();
        let link = network.get_link(Id::new(0));
        let slow = InternalVehicleType::new("slow", "car", 5., 1.);
        let l2l = Arc::new(FreeSpeedTravelTime).into_link_to_link().unwrap();

        assert_eq!(10., l2l.link_to_link_travel_time(link, link, 0., None, None));
        assert_eq!(40., l2l.link_to_link_travel_time(link, link, 0., None, Some(&slow)));
    }

    #[test]
    fn link_to_link_support() {
        assert!(Arc::new(FreeSpeedTravelTime).into_link_to_link().is_some());
        assert!(Arc::new(WalkTravelDisutility::new(1.)).into_link_to_link().is_some());
    }
}
