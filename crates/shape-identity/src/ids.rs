use uuid::Uuid;

/// Source of fresh shape ids.
///
/// Threaded explicitly through every pass so tests can swap in a
/// deterministic sequence.
pub trait IdGenerator {
    /// A new, never-nil id.
    fn next_id(&mut self) -> Uuid;

    /// Note an id that is already in use so it is never handed out again.
    fn reserve(&mut self, _id: Uuid) {}
}

/// Random v4 ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&mut self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Deterministic ids: `seed` in the high 64 bits, a counter in the low 64.
#[derive(Debug, Clone)]
pub struct SequentialIds {
    seed: u64,
    counter: u64,
}

impl SequentialIds {
    pub fn new(seed: u64) -> Self {
        Self { seed, counter: 0 }
    }

    /// How many ids have been handed out.
    pub fn issued(&self) -> u64 {
        self.counter
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self) -> Uuid {
        self.counter += 1;
        Uuid::from_u128(((self.seed as u128) << 64) | self.counter as u128)
    }

    fn reserve(&mut self, id: Uuid) {
        let bits = id.as_u128();
        if (bits >> 64) as u64 == self.seed {
            self.counter = self.counter.max(bits as u64);
        }
    }
}
