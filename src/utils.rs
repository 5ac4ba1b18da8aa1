use rand::seq::SliceRandom;
use rand::RngCore;
use rand_chacha::ChaCha8Rng;

/// Log at info level, with ANSI colours only when the display is colourful.
#[macro_export]
macro_rules! cinfo {
    ($colorful:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        if $colorful {
            log::info!("{}", message);
        } else {
            log::info!("{}", $crate::utils::strip_ansi(&message));
        }
    }};
}

/// Remove ANSI escape sequences (`ESC [ ... letter`) from a message.
pub fn strip_ansi(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut chars = message.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Split a Vec<T> into p contiguous Vec<T> of approximately the same size, keeping the order.
/// The first `len % p` chunks get one extra element.
pub fn split_into_balanced_chunks<T: Clone>(vec: &[T], p: usize) -> Vec<Vec<T>> {
    let n = vec.len();
    let base_size = n / p;
    let extra_elements = n % p;

    let mut chunks = Vec::with_capacity(p);
    let mut start = 0;
    for i in 0..p {
        let chunk_size = base_size + if i < extra_elements { 1 } else { 0 };
        let end = start + chunk_size;
        chunks.push(vec[start..end].to_vec());
        start = end;
    }
    chunks
}

/// Shuffle a Vec<T>, then split it into p Vec<T> of approximately the same size.
pub fn split_into_balanced_random_chunks<T: Clone>(vec: Vec<T>, p: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<T>> {
    let mut shuffled = vec;
    shuffled.shuffle(rng);
    split_into_balanced_chunks(&shuffled, p)
}

/// Draw one seed per parallel branch from a root generator, so that every branch owns a
/// reproducible stream whatever the number of threads.
pub fn derive_seeds(n: usize, rng: &mut ChaCha8Rng) -> Vec<u64> {
    (0..n).map(|_| rng.next_u64()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_split_into_balanced_chunks_sizes() {
        let chunks = split_into_balanced_chunks(&(0..10).collect::<Vec<usize>>(), 3);
        assert_eq!(chunks, vec![vec![0, 1, 2, 3], vec![4, 5, 6], vec![7, 8, 9]]);
    }

    #[test]
    fn test_split_into_balanced_chunks_more_chunks_than_elements() {
        let chunks = split_into_balanced_chunks(&[7, 8], 4);
        assert_eq!(chunks, vec![vec![7], vec![8], vec![], vec![]]);
    }

    #[test]
    fn test_split_into_balanced_random_chunks_preserves_elements() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let chunks = split_into_balanced_random_chunks((0..11).collect::<Vec<usize>>(), 4, &mut rng);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![3, 3, 3, 2]);
        let mut all: Vec<usize> = chunks.into_iter().flatten().collect();
        all.sort();
        assert_eq!(all, (0..11).collect::<Vec<usize>>());
    }

    #[test]
    fn test_derive_seeds_reproducible() {
        let a = derive_seeds(5, &mut ChaCha8Rng::seed_from_u64(7));
        let b = derive_seeds(5, &mut ChaCha8Rng::seed_from_u64(7));
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[1;93mFold #1\x1b[0m done"), "Fold #1 done");
        assert_eq!(strip_ansi("plain"), "plain");
    }
}
