/// StorageCap tracks the storage capacity of a link in pce.
///
/// Vehicles entering a link consume capacity immediately. Capacity released by vehicles leaving
/// the link only takes effect in the next time step, so that the order in which nodes and links are
/// processed within a time step doesn't decide whether freed space can be reused.
#[derive(Debug, Clone)]
pub struct StorageCap {
    max: f32,
    used: f32,
    released: f32,
    released_at: u32,
}

impl StorageCap {
    pub fn new(
        length: f64,
        perm_lanes: f32,
        capacity_h: f32,
        sample_size: f32,
        effective_cell_size: f32,
    ) -> Self {
        let flow_cap_s = capacity_h * sample_size / 3600.;
        let cap = length * perm_lanes as f64 * sample_size as f64 / effective_cell_size as f64;
        // storage capacity needs to be at least enough to handle the cap_per_time_step:
        let max_storage_cap = flow_cap_s.max(cap as f32);
        Self::with_max(max_storage_cap)
    }

    /// Storage capacity set explicitly, e.g. by the network loader.
    pub fn with_max(max: f32) -> Self {
        Self {
            max,
            used: 0.,
            released: 0.,
            released_at: 0,
        }
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    /// Capacity accounted as used at `now`. Releases from earlier time steps are deducted.
    pub fn used(&self, now: u32) -> f32 {
        if now > self.released_at {
            0f32.max(self.used - self.released)
        } else {
            self.used
        }
    }

    /// Tests whether a vehicle with `pce` fits onto the link at `now`.
    pub fn is_available(&self, pce: f32, now: u32) -> bool {
        self.used(now) + pce <= self.max + 1e-6
    }

    /// Consumes storage capacity on a link. Call this when a vehicle enters a link.
    pub fn consume(&mut self, pce: f32, now: u32) {
        self.apply_releases(now);
        self.used += pce;
    }

    /// Releases storage capacity on a link. Call this when a vehicle leaves a link.
    pub fn release(&mut self, pce: f32, now: u32) {
        self.apply_releases(now);
        self.released += pce;
        self.released_at = now;
    }

    fn apply_releases(&mut self, now: u32) {
        if now > self.released_at {
            self.used = 0f32.max(self.used - self.released);
            self.released = 0.;
            self.released_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::network::storage_cap::StorageCap;

    #[test]
    fn init_default() {
        let cap = StorageCap::new(100., 3., 1., 0.2, 7.5);
        assert_eq!(8., cap.max());
    }

    #[test]
    fn init_large_capacity() {
        let cap = StorageCap::new(100., 3., 360000., 0.2, 7.5);
        // we expect a storage size of 20. because the flow cap/s is 20 (360000 * 0.2 / 3600)
        assert_eq!(20., cap.max());
    }

    #[test]
    fn consume_until_full() {
        let mut cap = StorageCap::with_max(2.);
        assert!(cap.is_available(1., 0));
        cap.consume(1., 0);
        assert!(cap.is_available(1., 0));
        assert!(!cap.is_available(1.5, 0));
        cap.consume(1., 0);
        assert!(!cap.is_available(1., 0));
        assert_eq!(2., cap.used(0));
    }

    #[test]
    fn release_takes_effect_next_time_step() {
        let mut cap = StorageCap::with_max(1.);
        cap.consume(1., 3);
        cap.release(1., 5);

        assert!(!cap.is_available(1., 5));
        assert!(cap.is_available(1., 6));

        cap.consume(1., 6);
        assert_eq!(1., cap.used(6));
        assert!(!cap.is_available(1., 7));
    }
}
