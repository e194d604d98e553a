//! Chronologically sortable push keys.
//!
//! A key is 8 characters of millisecond timestamp followed by 12 random
//! characters, drawn from an alphabet whose ASCII order matches its digit
//! order.  Keys from one generator are strictly increasing: within the same
//! millisecond the random tail is incremented instead of redrawn.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

const ALPHABET: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";
const TIME_CHARS: usize = 8;
const RANDOM_CHARS: usize = 12;

struct State {
    last_millis: u64,
    tail: [u8; RANDOM_CHARS],
}

pub struct PushIdGenerator {
    state: Mutex<State>,
}

impl Default for PushIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                last_millis: 0,
                tail: [0; RANDOM_CHARS],
            }),
        }
    }

    /// Generate the next key using the wall clock.
    pub fn next_id(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.next_id_at(millis)
    }

    /// Generate the next key for the given timestamp.  A timestamp earlier
    /// than the previous one is treated as equal to it, so keys never go
    /// backwards when the clock does.
    pub fn next_id_at(&self, millis: u64) -> String {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if millis > state.last_millis {
            state.last_millis = millis;
            let mut rng = rand::thread_rng();
            for slot in state.tail.iter_mut() {
                *slot = rng.gen_range(0..64);
            }
        } else {
            increment_tail(&mut state.tail);
        }

        let mut out = String::with_capacity(TIME_CHARS + RANDOM_CHARS);
        let mut time = state.last_millis;
        let mut time_chars = [0u8; TIME_CHARS];
        for slot in time_chars.iter_mut().rev() {
            *slot = ALPHABET[(time % 64) as usize];
            time /= 64;
        }
        out.extend(time_chars.iter().map(|&b| b as char));
        out.extend(state.tail.iter().map(|&d| ALPHABET[d as usize] as char));
        out
    }
}

fn increment_tail(tail: &mut [u8; RANDOM_CHARS]) {
    for digit in tail.iter_mut().rev() {
        if *digit == 63 {
            *digit = 0;
        } else {
            *digit += 1;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_have_fixed_length() {
        let ids = PushIdGenerator::new();
        assert_eq!(ids.next_id().len(), TIME_CHARS + RANDOM_CHARS);
    }

    #[test]
    fn keys_increase_within_one_millisecond() {
        let ids = PushIdGenerator::new();
        let mut prev = ids.next_id_at(1_700_000_000_000);
        for _ in 0..500 {
            let next = ids.next_id_at(1_700_000_000_000);
            assert!(next > prev, "{next} should sort after {prev}");
            prev = next;
        }
    }

    #[test]
    fn keys_never_go_backwards_with_the_clock() {
        let ids = PushIdGenerator::new();
        let later = ids.next_id_at(2_000);
        let earlier = ids.next_id_at(1_000);
        assert!(earlier > later);
    }

    #[test]
    fn later_timestamps_sort_later() {
        let ids = PushIdGenerator::new();
        let a = ids.next_id_at(1_000);
        let b = ids.next_id_at(1_001);
        assert!(b > a);
    }
}
