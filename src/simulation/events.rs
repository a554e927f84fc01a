use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

use crate::simulation::id::Id;
use crate::simulation::network::Link;
use crate::simulation::vehicles::{Driver, InternalVehicle};

pub trait EventTrait: Debug + Any {
    //This can't be a const, because traits with const fields are not dyn compatible.
    fn type_(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn time(&self) -> u32;
}

type OnEventFn = dyn Fn(&dyn EventTrait) + 'static;

/// The EventsManager holds call-backs for event processing. Rust has no reflection, so handlers
/// are registered per concrete event type, which gives compile-time checking of the event types.
///
/// Handlers are not `Send`. The manager lives on the thread which runs the simulation.
#[derive(Default)]
pub struct EventsManager {
    per_type: HashMap<TypeId, Vec<Rc<OnEventFn>>>,
    catch_all: Vec<Box<OnEventFn>>,
    finish: Vec<Box<dyn Fn() + 'static>>,
}

impl Debug for EventsManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EventsManager {{ per_type: {:?}, catch_all: {:?}, finish: {:?} }}",
            self.per_type.len(),
            self.catch_all.len(),
            self.finish.len()
        )
    }
}

impl EventsManager {
    pub fn new() -> Self {
        EventsManager {
            per_type: HashMap::new(),
            catch_all: Vec::new(),
            finish: Vec::new(),
        }
    }

    pub fn publish_event(&mut self, event: &dyn EventTrait) {
        let tid = event.as_any().type_id();
        if let Some(list) = self.per_type.get(&tid) {
            for h in list {
                h(event);
            }
        }
        for h in &self.catch_all {
            h(event);
        }
    }

    pub fn finish(&mut self) {
        for f in self.finish.iter() {
            f()
        }
    }

    /// Registers a callback for a specific event type.
    pub fn on<E, F>(&mut self, f: F)
    where
        E: EventTrait,
        F: Fn(&E) + 'static,
    {
        let type_id = TypeId::of::<E>();
        let entry = self.per_type.entry(type_id).or_default();
        entry.push(Rc::new(move |ev: &dyn EventTrait| {
            if let Some(e) = ev.as_any().downcast_ref::<E>() {
                f(e);
            }
        }));
    }

    /// Registers a callback for all event types.
    pub fn on_any<F>(&mut self, f: F)
    where
        F: Fn(&dyn EventTrait) + 'static,
    {
        self.catch_all.push(Box::new(f));
    }

    pub fn on_finish<F>(&mut self, f: F)
    where
        F: Fn() + 'static,
    {
        self.finish.push(Box::new(f));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkEnterEvent {
    pub time: u32,
    pub link: Id<Link>,
    pub vehicle: Id<InternalVehicle>,
}

impl LinkEnterEvent {
    pub const TYPE: &'static str = "entered link";

    pub fn new(time: u32, link: Id<Link>, vehicle: Id<InternalVehicle>) -> Self {
        LinkEnterEvent {
            time,
            link,
            vehicle,
        }
    }
}

impl EventTrait for LinkEnterEvent {
    fn type_(&self) -> &'static str {
        Self::TYPE
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn time(&self) -> u32 {
        self.time
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkLeaveEvent {
    pub time: u32,
    pub link: Id<Link>,
    pub vehicle: Id<InternalVehicle>,
}

impl LinkLeaveEvent {
    pub const TYPE: &'static str = "left link";

    pub fn new(time: u32, link: Id<Link>, vehicle: Id<InternalVehicle>) -> Self {
        LinkLeaveEvent {
            time,
            link,
            vehicle,
        }
    }
}

impl EventTrait for LinkLeaveEvent {
    fn type_(&self) -> &'static str {
        Self::TYPE
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn time(&self) -> u32 {
        self.time
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleEntersTrafficEvent {
    pub time: u32,
    pub vehicle: Id<InternalVehicle>,
    pub driver: Id<Driver>,
    pub link: Id<Link>,
    pub mode: String,
}

impl VehicleEntersTrafficEvent {
    pub const TYPE: &'static str = "vehicle enters traffic";

    pub fn new(time: u32, vehicle: &InternalVehicle, link: Id<Link>) -> Self {
        VehicleEntersTrafficEvent {
            time,
            vehicle: vehicle.id,
            driver: vehicle.driver,
            link,
            mode: vehicle.mode().to_string(),
        }
    }
}

impl EventTrait for VehicleEntersTrafficEvent {
    fn type_(&self) -> &'static str {
        Self::TYPE
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn time(&self) -> u32 {
        self.time
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleLeavesTrafficEvent {
    pub time: u32,
    pub vehicle: Id<InternalVehicle>,
    pub driver: Id<Driver>,
    pub link: Id<Link>,
    pub mode: String,
}

impl VehicleLeavesTrafficEvent {
    pub const TYPE: &'static str = "vehicle leaves traffic";

    pub fn new(time: u32, vehicle: &InternalVehicle, link: Id<Link>) -> Self {
        VehicleLeavesTrafficEvent {
            time,
            vehicle: vehicle.id,
            driver: vehicle.driver,
            link,
            mode: vehicle.mode().to_string(),
        }
    }
}

impl EventTrait for VehicleLeavesTrafficEvent {
    fn type_(&self) -> &'static str {
        Self::TYPE
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn time(&self) -> u32 {
        self.time
    }
}
