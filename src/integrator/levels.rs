/// The power-of-two timestep ladder. Level 0 carries the largest
/// timestep T_0 of the current block and level l the timestep
/// T_l = T_0 2^-l; a particle on level l is updated every
/// 2^(level_max - l) base sub-steps.
#[derive(Debug, Clone)]
pub struct LevelLadder {
    pub nlevels: usize,
    pub dt_max: f64,
    /// Finest populated level; the base sub-step is dt_max / 2^level_max.
    pub level_max: usize,
    /// Sub-step counter within the current block, in [0, 2^level_max).
    pub nstep: usize,
}

impl LevelLadder {
    pub fn new(nlevels: usize) -> Self {
        Self {
            nlevels,
            dt_max: 0.0,
            level_max: 0,
            nstep: 0,
        }
    }

    pub fn dt_level(&self, level: usize) -> f64 {
        self.dt_max / 2u64.pow(level as u32) as f64
    }

    pub fn dt_base(&self) -> f64 {
        self.dt_level(self.level_max)
    }

    /// Number of base sub-steps between updates of `level`.
    fn stride(&self, level: usize) -> usize {
        2usize.pow((self.level_max - level.min(self.level_max)) as u32)
    }

    /// True when `level` has a step boundary at sub-step `nstep`.
    pub fn is_boundary(&self, level: usize, nstep: usize) -> bool {
        nstep % self.stride(level) == 0
    }

    /// A particle's step ends at the upcoming sub-step count.
    pub fn ends_step(&self, level: usize) -> bool {
        (self.nstep + 1) % self.stride(level) == 0
    }

    pub fn on_block_boundary(&self) -> bool {
        self.nstep == 0
    }

    /// Level whose timestep is the largest not exceeding `dt`; the
    /// log2-ratio clamped to the allowed range.
    pub fn level_from_dt(&self, dt: f64) -> usize {
        if dt <= 0.0 || self.dt_max <= 0.0 {
            return self.nlevels - 1;
        }
        let ratio = self.dt_max / dt;
        let level = ratio.log2().ceil().max(0.0) as usize;
        level.min(self.nlevels - 1)
    }

    /// Starts a new block with the level-0 timestep sized so the minimum
    /// candidate lands on the finest allowed rung.
    pub fn start_block(&mut self, dt_min: f64) {
        self.dt_max = dt_min * 2u64.pow(self.nlevels as u32 - 1) as f64;
        self.nstep = 0;
    }

    /// Updates the finest populated level, rescaling the sub-step
    /// counter so existing boundaries stay aligned.
    pub fn set_level_max(&mut self, level_max: usize) {
        let level_max = level_max.min(self.nlevels - 1);
        if level_max > self.level_max {
            self.nstep <<= level_max - self.level_max;
        } else if level_max < self.level_max {
            self.nstep >>= self.level_max - level_max;
        }
        self.level_max = level_max;
    }

    /// Advances to the next sub-step, wrapping at the end of the block.
    pub fn advance(&mut self) {
        self.nstep = (self.nstep + 1) % 2usize.pow(self.level_max as u32);
    }
}
