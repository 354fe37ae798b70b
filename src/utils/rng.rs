use std::cell::Cell;
use std::num::Wrapping;
use std::thread_local;

thread_local! {
    static RNG: Cell<Wrapping<u32>> = {
        // Take the address of a local value as seed.
        let mut x = 0i32;
        let r = &mut x;
        let addr = r as *mut i32 as usize;
        Cell::new(Wrapping((addr as u32) | 1))
    }
}

/// Advance the thread-local xorshift state and return the new word.
fn next() -> u32 {
    RNG.with(|rng| {
        // This is the 32-bit variant of Xorshift.
        //
        // Source: https://en.wikipedia.org/wiki/Xorshift
        let mut x = rng.get();
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        rng.set(x);
        x.0
    })
}

/// A fair coin flip.
pub(crate) fn flip() -> bool {
    // The low bits of xorshift are the weakest, use the top one.
    next() >> 31 == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_come_up() {
        let heads = (0..1_000).filter(|_| flip()).count();
        assert!(heads > 0 && heads < 1_000, "{heads} heads out of 1000");
    }
}
