//! Random numbers for one worker thread.
//!
//! A run's global seed is expanded into one seed per thread by reading a
//! root generator's output stream: thread `n` takes the `n`-th value.
//! Distribution samples and every random tie-break of a replication draw
//! from the thread's own [`SimRng`], so results repeat for a fixed seed and
//! thread count.

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};

/// Generator owned by one worker.  Passed around as `&mut SimRng`; never
/// shared between threads.
#[derive(Clone, Debug)]
pub struct SimRng(SmallRng);

impl SimRng {
    pub fn new(seed: u64) -> Self {
        SimRng(SmallRng::seed_from_u64(seed))
    }

    pub fn for_thread(global_seed: u64, thread_nr: usize) -> Self {
        let mut root = SmallRng::seed_from_u64(global_seed);
        let mut seed = root.next_u64();
        for _ in 0..thread_nr {
            seed = root.next_u64();
        }
        SimRng(SmallRng::seed_from_u64(seed))
    }

    #[inline]
    pub fn random<T>(&mut self) -> T
    where
        rand::distributions::Standard: rand::distributions::Distribution<T>,
    {
        self.0.r#gen()
    }

    /// Uniform sample in `[0, 1)`.
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        self.0.r#gen::<f64>()
    }

    /// Index in `0..len`; 0 for `len <= 1`.
    #[inline]
    pub fn pick_index(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        self.0.gen_range(0..len)
    }

    #[inline]
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        slice.choose(&mut self.0)
    }
}
