/// Flowcap spaces vehicles on a link according to its flow capacity.
///
/// A vehicle with pce `p` occupies `p / capacity_per_time_step` seconds of the link's capacity. Successive
/// entries and successive exits are at least that far apart. Times are kept as fractional seconds,
/// so that links with more than one vehicle per second admit several vehicles within one time step.
#[derive(Debug, Clone)]
pub struct Flowcap {
    capacity_per_time_step: f32,
    next_entry: f64,
    last_exit: f64,
}

impl Flowcap {
    pub(super) fn new(capacity_h: f32, sample_size: f32) -> Flowcap {
        let capacity_s = capacity_h * sample_size / 3600.;
        Flowcap {
            capacity_per_time_step: capacity_s,
            next_entry: 0.,
            last_exit: f64::NEG_INFINITY,
        }
    }

    pub(super) fn capacity_per_time_step(&self) -> f32 {
        self.capacity_per_time_step
    }

    /// Time a vehicle with `pce` occupies on the link.
    pub(super) fn headway(&self, pce: f32) -> f64 {
        pce as f64 / self.capacity_per_time_step as f64
    }

    /// Entry time of the next vehicle if it may enter during time step `now`.
    pub(super) fn entry_time(&self, now: u32) -> Option<f64> {
        let now = now as f64;
        let entry = f64::max(now, self.next_entry);
        (entry < now + 1.).then_some(entry)
    }

    /// Registers a vehicle entering at `entry_time` which could leave at `free_exit_time` on an empty
    /// link. Returns the exit time after spacing it behind the previous vehicle.
    pub(super) fn consume(&mut self, entry_time: f64, free_exit_time: f64, pce: f32) -> f64 {
        let headway = self.headway(pce);
        self.next_entry = entry_time + headway;
        let exit = f64::max(free_exit_time, self.last_exit + headway);
        self.last_exit = exit;
        exit
    }
}
