use chrono::{DateTime, Utc};

/// Whole seconds left on a question, rounded up, within `[0, time_limit]`.
/// Always derived from the shared start stamp, never from when an update
/// happened to arrive.
pub fn remaining(started_at: DateTime<Utc>, time_limit: u32, now: DateTime<Utc>) -> u32 {
    let limit_ms = i64::from(time_limit) * 1000;
    let elapsed_ms = (now - started_at).num_milliseconds();
    let left_ms = (limit_ms - elapsed_ms).clamp(0, limit_ms);

    ((left_ms + 999) / 1000) as u32
}

/// Seconds since the question started, within `[0, time_limit]`.
pub fn elapsed_secs(started_at: DateTime<Utc>, time_limit: u32, now: DateTime<Utc>) -> f64 {
    let elapsed = (now - started_at).num_milliseconds() as f64 / 1000.0;
    elapsed.clamp(0.0, f64::from(time_limit))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Running(u32),
    /// First tick at zero.
    TimeUp,
    Expired,
}

/// Countdown for one push of one question.
#[derive(Debug, Clone, PartialEq)]
pub struct Countdown {
    pub question_index: usize,
    pub started_at: DateTime<Utc>,
    pub time_limit: u32,
    fired: bool,
}

impl Countdown {
    pub fn new(question_index: usize, started_at: DateTime<Utc>, time_limit: u32) -> Self {
        Countdown {
            question_index,
            started_at,
            time_limit,
            fired: false,
        }
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> u32 {
        remaining(self.started_at, self.time_limit, now)
    }

    pub fn is_for(&self, question_index: usize, started_at: DateTime<Utc>) -> bool {
        self.question_index == question_index && self.started_at == started_at
    }

    /// Reports [`Tick::TimeUp`] once, on the first tick that finds no time left.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Tick {
        match self.remaining(now) {
            0 if self.fired => Tick::Expired,
            0 => {
                self.fired = true;
                Tick::TimeUp
            }
            left => Tick::Running(left),
        }
    }
}
