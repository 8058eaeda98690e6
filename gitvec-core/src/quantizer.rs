//! Quantizer: reduce a full embedding to a 64-dim projection, 2-bit
//! quantize it against its own quartiles, and render the result as a
//! 32-hex-character path.

use crate::projection::matrix::ProjectionMatrix;

/// `y = vector . M`, 64-dim output.
pub fn project(vector: &[f32], m: &ProjectionMatrix) -> Vec<f32> {
    m.multiply(vector)
}

/// Inclusive-linear quartiles of a 64-value slice.
fn quartiles(y: &[f32]) -> (f32, f32, f32) {
    let mut sorted = y.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();

    let at = |p: f64| -> f32 {
        let idx = p * (n as f64 - 1.0);
        let lo = idx.floor() as usize;
        let hi = idx.ceil() as usize;
        if lo == hi {
            sorted[lo]
        } else {
            let frac = (idx - lo as f64) as f32;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    };

    (at(0.25), at(0.5), at(0.75))
}

/// 2-bit quantize each of the 64 projected values against the vector's own
/// quartiles, pack into 128 bits, render as 32 lowercase hex chars.
pub fn quantize_projected(y: &[f32]) -> String {
    assert_eq!(y.len(), 64, "projection output must be 64-dim");
    let (q1, q2, q3) = quartiles(y);

    let mut bits: Vec<u8> = Vec::with_capacity(128);
    for &v in y {
        let code: u8 = if v >= q3 {
            3
        } else if v >= q2 {
            2
        } else if v >= q1 {
            1
        } else {
            0
        };
        bits.push((code >> 1) & 1);
        bits.push(code & 1);
    }

    let mut bytes = vec![0u8; 16];
    for (i, bit) in bits.iter().enumerate() {
        if *bit == 1 {
            bytes[i / 8] |= 1 << (7 - (i % 8));
        }
    }
    hex::encode(bytes)
}

/// Full pipeline: project then quantize.
pub fn quantize(vector: &[f32], m: &ProjectionMatrix) -> String {
    let y = project(vector, m);
    quantize_projected(&y)
}

/// Split a 32-hex-char quantized path into `depth_factor` two-char
/// directory components plus a suffix (the remaining hex chars).
pub fn to_path(hex_path: &str, depth_factor: usize) -> (Vec<String>, String) {
    assert_eq!(hex_path.len(), 32, "quantized path must be 32 hex chars");
    let take = (depth_factor * 2).min(32);
    let head = &hex_path[..take];
    let suffix = &hex_path[take..];

    let dirs = head
        .as_bytes()
        .chunks(2)
        .map(|c| std::str::from_utf8(c).unwrap().to_string())
        .collect();

    (dirs, suffix.to_string())
}

/// Enumerate every 128-bit string within Hamming distance `radius` of
/// `hex_path`'s bit representation, then truncate each to
/// `depth_factor` directory levels (the first `depth_factor` two-hex-char
/// components), deduplicating the resulting directory-path candidates.
///
/// The mapping truncates full 128-bit flips down to the prefix that
/// actually determines the
/// directory path, since flips past `2*depth_factor` hex chars land in
/// the file suffix and can never change which directory a neighbor would
/// be found in.
pub fn neighbor_dir_paths(hex_path: &str, depth_factor: usize, radius: u32) -> Vec<Vec<String>> {
    assert_eq!(hex_path.len(), 32);
    let prefix_bits = (depth_factor * 2 * 4).min(128);

    let bytes = hex::decode(hex_path).expect("valid hex");
    let mut bits: Vec<u8> = Vec::with_capacity(128);
    for b in &bytes {
        for i in (0..8).rev() {
            bits.push((b >> i) & 1);
        }
    }

    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    // radius 0: the path itself
    let base_dirs = to_path(hex_path, depth_factor).0;
    if seen.insert(base_dirs.clone()) {
        out.push(base_dirs);
    }

    // Only bit positions within the directory-determining prefix can
    // change the resulting directory path; flips outside that prefix only
    // change the file suffix and are skipped as a deliberate optimization.
    for r in 1..=radius {
        for combo in combinations(prefix_bits, r as usize) {
            let mut flipped = bits.clone();
            for &pos in &combo {
                flipped[pos] ^= 1;
            }
            let hex = bits_to_hex(&flipped);
            let dirs = to_path(&hex, depth_factor).0;
            if seen.insert(dirs.clone()) {
                out.push(dirs);
            }
        }
    }

    out
}

fn bits_to_hex(bits: &[u8]) -> String {
    let mut bytes = vec![0u8; bits.len() / 8];
    for (i, bit) in bits.iter().enumerate() {
        if *bit == 1 {
            bytes[i / 8] |= 1 << (7 - (i % 8));
        }
    }
    hex::encode(bytes)
}

/// All `k`-combinations of indices `0..n`, small-`n`/`k` only (n<=24,
/// k<=3 in practice for this quantizer's depth factors).
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut result = Vec::new();
    let mut current = Vec::with_capacity(k);
    fn go(start: usize, n: usize, k: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for i in start..n {
            current.push(i);
            go(i + 1, n, k, current, out);
            current.pop();
        }
    }
    go(0, n, k, &mut current, &mut result);
    result
}
