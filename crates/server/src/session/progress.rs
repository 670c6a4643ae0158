/// Upload progress against the size the client declared in its handshake.
///
/// Progress is informational: it is clamped to 100 and skipped entirely when
/// no positive size was declared.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    declared: i64,
    received: u64,
    last_percent: f64,
}

impl ProgressTracker {
    pub fn new(declared: i64) -> Self {
        Self {
            declared,
            received: 0,
            last_percent: 0.0,
        }
    }

    /// Count `len` more bytes and return the percentage to report, if any.
    pub fn record(&mut self, len: usize) -> Option<f64> {
        self.received = self.received.saturating_add(len as u64);
        if self.declared <= 0 {
            return None;
        }
        let percent = (self.received as f64 * 100.0 / self.declared as f64).min(100.0);
        self.last_percent = percent;
        Some(percent)
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn last_percent(&self) -> f64 {
        self.last_percent
    }

    /// Every declared byte has arrived.
    pub fn is_complete(&self) -> bool {
        self.declared > 0 && self.received >= self.declared as u64
    }

    /// More bytes arrived than were declared.
    pub fn is_overrun(&self) -> bool {
        self.declared > 0 && self.received > self.declared as u64
    }
}
