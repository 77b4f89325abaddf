use crate::error::SchedulerResult;
use crate::internal_error;
use crate::update::{Stage, StageFilter, Update};
use super::bucket::{EnqueueOutcome, StageBucket};

/// One level of the scope stack: pending updates for the execution in progress
/// at that depth, one bucket per stage
#[derive(Default)]
pub struct Frame {
    /// Stage of the update that owns this frame (`None` for the depth-0 frame)
    active_stage: Option<Stage>,
    buckets: [StageBucket; 2],
}

impl Frame {
    /// Depth-0 frame: nothing running, every stage still ahead
    pub fn root() -> Self {
        Self::default()
    }

    /// Frame holding the sub-updates of an update running at `stage`
    pub fn child(stage: Stage) -> Self {
        Self {
            active_stage: Some(stage),
            buckets: Default::default(),
        }
    }

    pub fn active_stage(&self) -> Option<Stage> {
        self.active_stage
    }

    /// Stage an update requested at `requested` actually lands in.
    /// A stage that has already passed for this frame is lifted to the active one.
    pub fn effective_stage(&self, requested: Stage) -> Stage {
        match self.active_stage {
            Some(active) => requested.max(active),
            None => requested,
        }
    }

    pub fn push(&mut self, update: Update, stage: Stage) -> EnqueueOutcome {
        let stage = self.effective_stage(stage);
        self.buckets[stage.index()].push(update)
    }

    /// Return an update that was popped but not run to the head of its bucket
    pub fn push_front(&mut self, update: Update, stage: Stage) -> EnqueueOutcome {
        let stage = self.effective_stage(stage);
        self.buckets[stage.index()].push_front(update)
    }

    pub fn pop_front(&mut self, stage: Stage) -> Option<Update> {
        self.buckets[stage.index()].pop_front()
    }

    pub fn bucket_mut(&mut self, stage: Stage) -> &mut StageBucket {
        &mut self.buckets[stage.index()]
    }

    pub fn pending_count(&self, filter: StageFilter) -> usize {
        filter.stages().iter().map(|s| self.buckets[s.index()].len()).sum()
    }

    pub fn pending_kinds(&self, filter: StageFilter) -> Vec<String> {
        filter
            .stages()
            .iter()
            .flat_map(|s| self.buckets[s.index()].kinds())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_count(StageFilter::All) == 0
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }
}

/// Stack of frames modelling re-entrant execution
///
/// - `frames[0]` is the depth-0 frame, present for the scheduler's lifetime
/// - A frame is pushed for each running update and popped when it finishes
/// - Only the top frame accepts newly enqueued updates
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::root()],
        }
    }

    /// Number of frames pushed above depth 0
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn current(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    pub fn current_mut(&mut self) -> &mut Frame {
        let top = self.frames.len() - 1;
        &mut self.frames[top]
    }

    pub fn root_mut(&mut self) -> &mut Frame {
        &mut self.frames[0]
    }

    pub fn frame_mut(&mut self, depth: usize) -> Option<&mut Frame> {
        self.frames.get_mut(depth)
    }

    /// Push a child frame for an update running at `stage`; returns the new depth
    pub fn descend(&mut self, stage: Stage) -> usize {
        self.frames.push(Frame::child(stage));
        self.depth()
    }

    /// Pop the top frame, moving whatever it still holds into the parent
    /// (with merging). Returns how many updates were moved.
    pub fn ascend(&mut self) -> SchedulerResult<usize> {
        if self.frames.len() <= 1 {
            return Err(internal_error!("cannot ascend past the depth-0 frame"));
        }

        let mut child = match self.frames.pop() {
            Some(frame) => frame,
            None => return Err(internal_error!("scope stack is empty")),
        };

        let parent = self.current_mut();
        let mut moved = 0;
        for stage in Stage::ORDERED {
            for update in child.bucket_mut(stage).take_all() {
                parent.push(update, stage);
                moved += 1;
            }
        }
        Ok(moved)
    }
}
