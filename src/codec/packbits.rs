//! PackBits scanline codec.
//!
//! Each compressed scanline is a sequence of runs selected by a signed
//! control byte `n`:
//!
//! ```text
//!   0 ..=  127   copy the next n + 1 bytes literally
//! -127 ..=  -1   repeat the next byte 1 - n times (2..=128)
//!        -128    no-op
//! ```
//!
//! Decoding is bounded on both sides: the compressed budget of the scanline
//! and its decoded width.  Running out of either before the other is a
//! [`Fault::Corrupt`].

use crate::error::Fault;

/// Decode one scanline from `src` into `dst`, which must come out exactly
/// full.  `src` must be consumed completely; trailing no-op controls are
/// tolerated.
pub fn decode_scanline(src: &[u8], dst: &mut [u8]) -> Result<(), Fault> {
    let mut i = 0usize;
    let mut o = 0usize;

    while o < dst.len() {
        let Some(&ctrl) = src.get(i) else {
            return Err(Fault::Corrupt(format!(
                "scanline budget exhausted after {} of {} bytes",
                o,
                dst.len()
            )));
        };
        i += 1;

        let n = ctrl as i8;
        if n >= 0 {
            let len = n as usize + 1;
            if i + len > src.len() {
                return Err(Fault::Corrupt("literal run overruns the compressed scanline".into()));
            }
            if o + len > dst.len() {
                return Err(Fault::Corrupt("literal run overruns the scanline width".into()));
            }
            dst[o..o + len].copy_from_slice(&src[i..i + len]);
            i += len;
            o += len;
        } else if n != -128 {
            let len = (1 - n as i32) as usize;
            let Some(&b) = src.get(i) else {
                return Err(Fault::Corrupt("repeat run is missing its byte".into()));
            };
            i += 1;
            if o + len > dst.len() {
                return Err(Fault::Corrupt("repeat run overruns the scanline width".into()));
            }
            dst[o..o + len].fill(b);
            o += len;
        }
    }

    // Output is full; only no-op padding may remain.
    if src[i..].iter().any(|&b| b != 0x80) {
        return Err(Fault::Corrupt(format!(
            "{} compressed bytes left after a full scanline",
            src.len() - i
        )));
    }
    Ok(())
}

fn run_length(src: &[u8], at: usize) -> usize {
    let b = src[at];
    src[at..].iter().take(128).take_while(|&&x| x == b).count()
}

/// Append the PackBits encoding of `src` to `out`.
///
/// Runs of three or more identical bytes become repeat runs; everything else
/// is gathered into literal runs of up to 128 bytes.
pub fn encode_scanline(src: &[u8], out: &mut Vec<u8>) {
    let mut i = 0usize;
    while i < src.len() {
        let run = run_length(src, i);
        if run >= 3 {
            out.push((1 - run as i32) as i8 as u8);
            out.push(src[i]);
            i += run;
            continue;
        }

        let start = i;
        while i < src.len() && i - start < 128 {
            if run_length(src, i) >= 3 {
                break;
            }
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&src[start..i]);
    }
}

/// Encode `data` as consecutive scanlines of `row_bytes` each.
/// Returns the per-scanline compressed sizes and the concatenated runs.
pub fn encode_rows(data: &[u8], row_bytes: usize) -> (Vec<usize>, Vec<u8>) {
    let mut counts = Vec::new();
    let mut out = Vec::with_capacity(data.len() / 2 + 16);
    if row_bytes == 0 {
        return (counts, out);
    }
    for row in data.chunks(row_bytes) {
        let before = out.len();
        encode_scanline(row, &mut out);
        counts.push(out.len() - before);
    }
    (counts, out)
}
