//! Scale-burst transition: uniform scale 1 -> 0 -> 1 along a half cosine.

use std::f32::consts::PI;

/// Result of advancing the animation by one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleStep {
    /// Uniform scale to apply this frame.
    pub value: f32,
    /// True on the frame the midpoint handler should run.
    pub fire: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleAnimation {
    step: u32,
    step_end: u32,
    step_event: f32,
    looping: bool,
    armed: bool,
    running: bool,
    value: f32,
}

impl ScaleAnimation {
    /// An idle animation holding scale 1.0.
    pub fn idle() -> Self {
        Self {
            step: 0,
            step_end: 1,
            step_event: 0.5,
            looping: false,
            armed: false,
            running: false,
            value: 1.0,
        }
    }

    /// Start a burst lasting `duration` seconds at `frame_rate` frames per second.
    pub fn start(duration: f32, frame_rate: f32, looping: bool) -> Self {
        let step_end = ((duration * frame_rate).floor() as i64).max(1) as u32;
        Self {
            step: 0,
            step_end,
            step_event: step_end as f32 / 2.0,
            looping,
            armed: true,
            running: true,
            value: 1.0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn total_frames(&self) -> u32 {
        self.step_end
    }

    /// Advance one frame. Idle animations return scale 1.0 and never fire.
    pub fn advance(&mut self) -> ScaleStep {
        if !self.running {
            return ScaleStep {
                value: self.value,
                fire: false,
            };
        }

        let progress = self.step as f32 / self.step_end as f32 * PI;
        self.value = progress.cos().abs();
        self.step += 1;

        if self.step >= self.step_end {
            self.step = 0;
            if self.looping {
                self.armed = true;
            } else {
                self.running = false;
                self.value = 1.0;
            }
        }

        let mut fire = false;
        if self.armed && (self.step as f32 >= self.step_event || !self.running) {
            self.armed = false;
            fire = true;
        }

        ScaleStep {
            value: self.value,
            fire,
        }
    }
}

impl Default for ScaleAnimation {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_count_from_duration() {
        assert_eq!(ScaleAnimation::start(0.4, 60.0, false).total_frames(), 24);
        assert_eq!(ScaleAnimation::start(0.0, 60.0, false).total_frames(), 1);
    }

    #[test]
    fn test_fires_once_at_midpoint() {
        let mut anim = ScaleAnimation::start(0.4, 60.0, false);
        let mut fired_at = Vec::new();
        let mut min_value: f32 = 1.0;
        for frame in 0..40 {
            let step = anim.advance();
            min_value = min_value.min(step.value);
            if step.fire {
                fired_at.push(frame);
            }
        }
        // 24 frames, midpoint after step 12
        assert_eq!(fired_at, vec![11]);
        assert!(min_value < 0.1);
        assert!(!anim.is_running());
        assert_eq!(anim.value(), 1.0);
    }

    #[test]
    fn test_single_frame_burst_still_fires() {
        let mut anim = ScaleAnimation::start(0.001, 60.0, false);
        let step = anim.advance();
        assert!(step.fire);
        assert!(!anim.is_running());
    }

    #[test]
    fn test_looping_fires_every_cycle() {
        let mut anim = ScaleAnimation::start(0.1, 60.0, true);
        let fires = (0..18).filter(|_| anim.advance().fire).count();
        assert_eq!(fires, 3);
        assert!(anim.is_running());
    }

    #[test]
    fn test_idle_holds_unit_scale() {
        let mut anim = ScaleAnimation::idle();
        let step = anim.advance();
        assert_eq!(step.value, 1.0);
        assert!(!step.fire);
    }
}
