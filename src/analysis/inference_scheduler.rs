// src/analysis/inference_scheduler.rs
//
// Throttled detection. The detector only runs on every Nth frame of a
// lane; frames in between reuse the previous boxes for the overlay.

/// Decides when to run the detector for one lane
pub struct InferenceScheduler {
    /// Run the detector when `frame_counter % infer_every == 0`
    infer_every: u32,

    /// Frames seen by this lane
    frame_counter: u64,

    /// Times the detector was invoked
    invocations: u64,
}

impl InferenceScheduler {
    pub fn new(infer_every: u32) -> Self {
        Self {
            infer_every: infer_every.max(1),
            frame_counter: 0,
            invocations: 0,
        }
    }

    /// Advances the frame counter and reports whether this frame is a
    /// detection tick. The first frame always is.
    pub fn should_run(&mut self) -> bool {
        let run = self.frame_counter % self.infer_every as u64 == 0;
        self.frame_counter += 1;
        if run {
            self.invocations += 1;
        }
        run
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn get_stats(&self) -> SchedulerStats {
        SchedulerStats {
            total_frames: self.frame_counter,
            invocations: self.invocations,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerStats {
    pub total_frames: u64,
    pub invocations: u64,
}
