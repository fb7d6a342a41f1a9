use netlab_abstract::{HostContext, SimTime, SimulationHost, TimerId};

/// A self-rescheduling task bound to a finite lifetime.
///
/// After each tick the owner calls `rearm`; the next tick is scheduled only
/// while the task is not cancelled and `now + period <= until`.
#[derive(Debug, Clone)]
pub struct PeriodicTask {
    timer: TimerId,
    period: SimTime,
    until: SimTime,
    cancelled: bool,
}

impl PeriodicTask {
    pub fn new(timer: TimerId, period: SimTime, until: SimTime) -> Self {
        Self {
            timer,
            period,
            until,
            cancelled: false,
        }
    }

    pub fn timer(&self) -> TimerId {
        self.timer
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Schedule the first tick before the run. Returns false if `at` is past `until`.
    pub fn start(&self, host: &mut dyn SimulationHost, at: SimTime) -> bool {
        if self.cancelled || at > self.until {
            return false;
        }
        host.schedule(at, self.timer);
        true
    }

    pub fn next_tick(&self, now: SimTime) -> Option<SimTime> {
        if self.cancelled || self.period == SimTime::ZERO {
            return None;
        }
        let next = now.saturating_add(self.period);
        (next <= self.until).then_some(next)
    }

    pub fn rearm(&self, ctx: &mut dyn HostContext) -> bool {
        match self.next_tick(ctx.now()) {
            Some(next) => {
                ctx.schedule(next, self.timer);
                true
            }
            None => false,
        }
    }

    pub fn cancel(&mut self, ctx: &mut dyn HostContext) {
        self.cancelled = true;
        ctx.cancel(self.timer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_rearming_at_until() {
        let task = PeriodicTask::new(TimerId(1), SimTime::from_millis(1), SimTime::from_millis(3));
        assert_eq!(
            task.next_tick(SimTime::from_millis(2)),
            Some(SimTime::from_millis(3))
        );
        assert_eq!(task.next_tick(SimTime::from_micros(2500)), None);
    }

    #[test]
    fn zero_period_never_rearms() {
        let task = PeriodicTask::new(TimerId(1), SimTime::ZERO, SimTime::from_millis(3));
        assert_eq!(task.next_tick(SimTime::ZERO), None);
    }
}
