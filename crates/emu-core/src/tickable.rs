//! Components advanced one processor cycle at a time.

/// A bus-less component advanced in lock-step with the processor.
///
/// Timers, disk controllers and sound chips implement this. Anything that
/// needs to touch memory does so through the machine, not from `tick`.
pub trait Tickable {
    /// Advance by one processor cycle.
    fn tick(&mut self);

    /// Advance by `cycles` processor cycles.
    ///
    /// Must behave exactly like calling `tick()` that many times.
    fn tick_n(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.tick();
        }
    }
}
