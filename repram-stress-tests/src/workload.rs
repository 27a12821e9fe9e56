use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Get,
    Put,
}

/// Workload profiles controlling the mix of operations the worker issues.
///
/// REPRAM has no delete, so every profile splits its roll between GET and PUT only.
///
/// | Profile     | GET % | PUT % |
/// |-------------|-------|-------|
/// | ReadHeavy   |   80  |   20  |
/// | Balanced    |   50  |   50  |
/// | WriteHeavy  |   20  |   80  |
/// | PutOnly     |    0  |  100  |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadProfile {
    ReadHeavy,
    Balanced,
    WriteHeavy,
    PutOnly,
}

impl WorkloadProfile {
    /// Draw a random operation using `rng`.
    pub fn sample(&self, rng: &mut impl Rng) -> Op {
        let roll: u32 = rng.gen_range(0..100);
        self.op_for_roll(roll)
    }

    /// Map a roll in `0..100` to an `Op` according to the profile's percentages.
    /// Exposed for deterministic testing.
    pub fn op_for_roll(&self, roll: u32) -> Op {
        match self {
            WorkloadProfile::ReadHeavy => {
                if roll < 80 { Op::Get } else { Op::Put }
            }
            WorkloadProfile::Balanced => {
                if roll < 50 { Op::Get } else { Op::Put }
            }
            WorkloadProfile::WriteHeavy => {
                if roll < 20 { Op::Get } else { Op::Put }
            }
            WorkloadProfile::PutOnly => Op::Put,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "read-heavy" => Some(WorkloadProfile::ReadHeavy),
            "balanced" => Some(WorkloadProfile::Balanced),
            "write-heavy" => Some(WorkloadProfile::WriteHeavy),
            "put-only" => Some(WorkloadProfile::PutOnly),
            _ => None,
        }
    }

    pub fn as_name(&self) -> &'static str {
        match self {
            WorkloadProfile::ReadHeavy => "read-heavy",
            WorkloadProfile::Balanced => "balanced",
            WorkloadProfile::WriteHeavy => "write-heavy",
            WorkloadProfile::PutOnly => "put-only",
        }
    }
}
