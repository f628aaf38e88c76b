/// Integer moving average over a fixed window of samples.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: Vec<i64>,
    count: u64,
    total: i64,
    average: i64,
}

impl MovingAverage {
    /// A window of `size` samples (minimum 1).
    pub fn new(size: usize) -> Self {
        Self {
            window: vec![0; size.max(1)],
            count: 0,
            total: 0,
            average: 0,
        }
    }

    pub fn update(&mut self, sample: i64) {
        let len = self.window.len() as u64;
        let slot = (self.count % len) as usize;
        self.count += 1;

        self.total += sample - self.window[slot];
        self.window[slot] = sample;
        self.average = self.total / self.count.min(len) as i64;
    }

    /// Mean of the last `min(count, window)` samples; 0 before any sample.
    pub fn average(&self) -> i64 {
        self.average
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_partial_window() {
        let mut avg = MovingAverage::new(4);
        assert_eq!(avg.average(), 0);
        avg.update(10);
        avg.update(20);
        assert_eq!(avg.average(), 15);
    }

    #[test]
    fn old_samples_fall_out() {
        let mut avg = MovingAverage::new(3);
        for sample in [3, 3, 3, 9, 9, 9] {
            avg.update(sample);
        }
        assert_eq!(avg.average(), 9);
        assert_eq!(avg.count(), 6);

        avg.update(0);
        assert_eq!(avg.average(), 6);
    }
}
