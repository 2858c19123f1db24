//! MD5 compression function and the extended state sequence used by the
//! collision search.
//!
//! The 64 steps are described by data ([`STEPS`]) instead of four
//! near-identical round macros. Every step has the form
//!
//! ```text
//! Q[t] = Q[t-1] + ((f(Q[t-1], Q[t-2], Q[t-3]) + Q[t-4] + X[k] + T[t]) <<< s)
//! ```
//!
//! which is exactly what [`StateTrace`] evaluates forwards and inverts
//! backwards when deriving message words from chosen state values.

use std::ops::{Index, IndexMut};

use crate::bits::rotate_right;

/// MD5 auxiliary function F used in steps 1-16.
///
/// F(X,Y,Z) = (X ∧ Y) ∨ (¬X ∧ Z)
///
/// Acts as a bitwise multiplexer: where X is set take Y, otherwise take Z.
/// The tunnels rely on this: a bit of Y or Z can change freely wherever
/// X selects the other input.
#[inline(always)]
pub fn f(x: u32, y: u32, z: u32) -> u32 {
    x & y | !x & z
}

/// MD5 auxiliary function G used in steps 17-32.
///
/// G(X,Y,Z) = (X ∧ Z) ∨ (Y ∧ ¬Z), i.e. F(Z,X,Y).
#[inline(always)]
pub fn g(x: u32, y: u32, z: u32) -> u32 {
    x & z | y & !z
}

/// MD5 auxiliary function H used in steps 33-48.
///
/// H(X,Y,Z) = X ⊕ Y ⊕ Z
#[inline(always)]
pub fn h(x: u32, y: u32, z: u32) -> u32 {
    x ^ y ^ z
}

/// MD5 auxiliary function I used in steps 49-64.
///
/// I(X,Y,Z) = Y ⊕ (X ∨ ¬Z)
#[inline(always)]
pub fn i(x: u32, y: u32, z: u32) -> u32 {
    y ^ (x | !z)
}

/// Nonlinear function selector of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundFunction {
    F,
    G,
    H,
    I,
}

impl RoundFunction {
    #[inline(always)]
    pub fn apply(self, x: u32, y: u32, z: u32) -> u32 {
        match self {
            RoundFunction::F => f(x, y, z),
            RoundFunction::G => g(x, y, z),
            RoundFunction::H => h(x, y, z),
            RoundFunction::I => i(x, y, z),
        }
    }
}

/// One of the 64 MD5 steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Round function of the step's phase
    pub function: RoundFunction,
    /// Index of the message word consumed by the step
    pub word: usize,
    /// Left rotation amount
    pub shift: u32,
    /// Additive constant T[t] = floor(2^32 * |sin(t)|)
    pub constant: u32,
}

const fn step(function: RoundFunction, word: usize, shift: u32, constant: u32) -> Step {
    Step {
        function,
        word,
        shift,
        constant,
    }
}

use RoundFunction::{F, G, H, I};

/// The RFC 1321 step table. `STEPS[t - 1]` describes step `t`.
pub const STEPS: [Step; 64] = [
    // Round 1: shifts 7, 12, 17, 22, words in order
    step(F, 0, 7, 0xd76aa478),
    step(F, 1, 12, 0xe8c7b756),
    step(F, 2, 17, 0x242070db),
    step(F, 3, 22, 0xc1bdceee),
    step(F, 4, 7, 0xf57c0faf),
    step(F, 5, 12, 0x4787c62a),
    step(F, 6, 17, 0xa8304613),
    step(F, 7, 22, 0xfd469501),
    step(F, 8, 7, 0x698098d8),
    step(F, 9, 12, 0x8b44f7af),
    step(F, 10, 17, 0xffff5bb1),
    step(F, 11, 22, 0x895cd7be),
    step(F, 12, 7, 0x6b901122),
    step(F, 13, 12, 0xfd987193),
    step(F, 14, 17, 0xa679438e),
    step(F, 15, 22, 0x49b40821),
    // Round 2: shifts 5, 9, 14, 20, words 1 + 5i
    step(G, 1, 5, 0xf61e2562),
    step(G, 6, 9, 0xc040b340),
    step(G, 11, 14, 0x265e5a51),
    step(G, 0, 20, 0xe9b6c7aa),
    step(G, 5, 5, 0xd62f105d),
    step(G, 10, 9, 0x02441453),
    step(G, 15, 14, 0xd8a1e681),
    step(G, 4, 20, 0xe7d3fbc8),
    step(G, 9, 5, 0x21e1cde6),
    step(G, 14, 9, 0xc33707d6),
    step(G, 3, 14, 0xf4d50d87),
    step(G, 8, 20, 0x455a14ed),
    step(G, 13, 5, 0xa9e3e905),
    step(G, 2, 9, 0xfcefa3f8),
    step(G, 7, 14, 0x676f02d9),
    step(G, 12, 20, 0x8d2a4c8a),
    // Round 3: shifts 4, 11, 16, 23, words 5 + 3i
    step(H, 5, 4, 0xfffa3942),
    step(H, 8, 11, 0x8771f681),
    step(H, 11, 16, 0x6d9d6122),
    step(H, 14, 23, 0xfde5380c),
    step(H, 1, 4, 0xa4beea44),
    step(H, 4, 11, 0x4bdecfa9),
    step(H, 7, 16, 0xf6bb4b60),
    step(H, 10, 23, 0xbebfbc70),
    step(H, 13, 4, 0x289b7ec6),
    step(H, 0, 11, 0xeaa127fa),
    step(H, 3, 16, 0xd4ef3085),
    step(H, 6, 23, 0x04881d05),
    step(H, 9, 4, 0xd9d4d039),
    step(H, 12, 11, 0xe6db99e5),
    step(H, 15, 16, 0x1fa27cf8),
    step(H, 2, 23, 0xc4ac5665),
    // Round 4: shifts 6, 10, 15, 21, words 7i
    step(I, 0, 6, 0xf4292244),
    step(I, 7, 10, 0x432aff97),
    step(I, 14, 15, 0xab9423a7),
    step(I, 5, 21, 0xfc93a039),
    step(I, 12, 6, 0x655b59c3),
    step(I, 3, 10, 0x8f0ccc92),
    step(I, 10, 15, 0xffeff47d),
    step(I, 1, 21, 0x85845dd1),
    step(I, 8, 6, 0x6fa87e4f),
    step(I, 15, 10, 0xfe2ce6e0),
    step(I, 6, 15, 0xa3014314),
    step(I, 13, 21, 0x4e0811a1),
    step(I, 4, 6, 0xf7537e82),
    step(I, 11, 10, 0xbd3af235),
    step(I, 2, 15, 0x2ad7d2bb),
    step(I, 9, 21, 0xeb86d391),
];

/// MD5 chaining state (A, B, C, D).
///
/// Used as the initialization vector of a block, as the intermediate hash
/// value (IHV) a block produces, and as the final digest words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainingState {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
}

impl ChainingState {
    /// RFC 1321 standard initial values
    pub const STANDARD: Self = Self {
        a: 0x67452301,
        b: 0xefcdab89,
        c: 0x98badcfe,
        d: 0x10325476,
    };

    /// Custom initial values
    pub const fn custom(a: u32, b: u32, c: u32, d: u32) -> Self {
        Self { a, b, c, d }
    }

    pub const fn from_words(words: [u32; 4]) -> Self {
        Self::custom(words[0], words[1], words[2], words[3])
    }

    pub const fn to_words(self) -> [u32; 4] {
        [self.a, self.b, self.c, self.d]
    }

    /// Word-wise addition modulo 2^32.
    pub fn wrapping_add(self, other: Self) -> Self {
        Self {
            a: self.a.wrapping_add(other.a),
            b: self.b.wrapping_add(other.b),
            c: self.c.wrapping_add(other.c),
            d: self.d.wrapping_add(other.d),
        }
    }

    /// Word-wise subtraction modulo 2^32, the additive difference `self - other`.
    pub fn wrapping_sub(self, other: Self) -> Self {
        Self {
            a: self.a.wrapping_sub(other.a),
            b: self.b.wrapping_sub(other.b),
            c: self.c.wrapping_sub(other.c),
            d: self.d.wrapping_sub(other.d),
        }
    }

    /// Little-endian byte rendering, the usual MD5 digest layout.
    pub fn to_le_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        for (chunk, word) in out.chunks_exact_mut(4).zip(self.to_words()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }
}

impl Default for ChainingState {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Apply the 64 MD5 steps to `state` without the final feed-forward.
pub fn permute(state: ChainingState, block: &[u32; 16]) -> ChainingState {
    let ChainingState {
        mut a,
        mut b,
        mut c,
        mut d,
    } = state;

    for step in STEPS.iter() {
        let sum = step
            .function
            .apply(b, c, d)
            .wrapping_add(a)
            .wrapping_add(block[step.word])
            .wrapping_add(step.constant);
        let next = b.wrapping_add(sum.rotate_left(step.shift));
        a = d;
        d = c;
        c = b;
        b = next;
    }

    ChainingState { a, b, c, d }
}

/// Process a single raw 512-bit block: permutation plus Davies-Meyer
/// feed-forward, returning the block's intermediate hash value.
pub fn compress(state: ChainingState, block: &[u32; 16]) -> ChainingState {
    state.wrapping_add(permute(state, block))
}

/// Extended state sequence Q[-3..=64] of one compression.
///
/// Q[-3], Q[0], Q[-1], Q[-2] are the A, B, C, D words of the IV; Q[t] for
/// `t >= 1` is the register written by step `t`. Indexing uses signed step
/// numbers, so the search code reads like the step relations it encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTrace {
    words: [u32; 68],
}

const TRACE_OFFSET: i32 = 3;

impl Index<i32> for StateTrace {
    type Output = u32;

    #[inline(always)]
    fn index(&self, t: i32) -> &u32 {
        &self.words[(t + TRACE_OFFSET) as usize]
    }
}

impl IndexMut<i32> for StateTrace {
    #[inline(always)]
    fn index_mut(&mut self, t: i32) -> &mut u32 {
        &mut self.words[(t + TRACE_OFFSET) as usize]
    }
}

impl StateTrace {
    /// A trace holding only the initialization vector.
    pub fn new(iv: ChainingState) -> Self {
        let mut trace = Self { words: [0; 68] };
        trace[-3] = iv.a;
        trace[0] = iv.b;
        trace[-1] = iv.c;
        trace[-2] = iv.d;
        trace
    }

    /// Full trace of compressing `block` over `iv`.
    pub fn from_block(iv: ChainingState, block: &[u32; 16]) -> Self {
        let mut trace = Self::new(iv);
        for t in 1..=64 {
            trace.advance(block, t);
        }
        trace
    }

    /// The initialization vector this trace starts from.
    pub fn iv(&self) -> ChainingState {
        ChainingState::custom(self[-3], self[0], self[-1], self[-2])
    }

    /// Pre-rotation sum Σt of step `t`.
    #[inline(always)]
    pub fn sigma(&self, x: &[u32; 16], t: i32) -> u32 {
        let step = &STEPS[(t - 1) as usize];
        step.function
            .apply(self[t - 1], self[t - 2], self[t - 3])
            .wrapping_add(self[t - 4])
            .wrapping_add(x[step.word])
            .wrapping_add(step.constant)
    }

    /// Store Q[t] computed from an already evaluated Σt.
    #[inline(always)]
    pub fn advance_with(&mut self, t: i32, sigma: u32) -> u32 {
        let shift = STEPS[(t - 1) as usize].shift;
        let value = self[t - 1].wrapping_add(sigma.rotate_left(shift));
        self[t] = value;
        value
    }

    /// Compute and store Q[t] from the forward step relation.
    #[inline(always)]
    pub fn advance(&mut self, x: &[u32; 16], t: i32) -> u32 {
        let sigma = self.sigma(x, t);
        self.advance_with(t, sigma)
    }

    /// Σt recovered from the outputs of step `t`: `(Q[t] - Q[t-1]) >>> s`.
    #[inline(always)]
    pub fn rotated_difference(&self, t: i32) -> u32 {
        let shift = STEPS[(t - 1) as usize].shift;
        rotate_right(self[t].wrapping_sub(self[t - 1]), shift)
    }

    /// Invert step `t`: store into `x` the message word that makes the step
    /// map Q[t-4..t-1] onto the current Q[t]. Returns the word.
    #[inline(always)]
    pub fn derive_word(&self, x: &mut [u32; 16], t: i32) -> u32 {
        let step = &STEPS[(t - 1) as usize];
        let word = self
            .rotated_difference(t)
            .wrapping_sub(step.function.apply(self[t - 1], self[t - 2], self[t - 3]))
            .wrapping_sub(self[t - 4])
            .wrapping_sub(step.constant);
        x[step.word] = word;
        word
    }

    /// Intermediate hash value once Q[61..=64] are known.
    pub fn output(&self) -> ChainingState {
        self.iv()
            .wrapping_add(ChainingState::custom(self[61], self[64], self[63], self[62]))
    }
}

/// Little-endian words of a 64-byte block.
pub fn bytes_to_words(block: &[u8; 64]) -> [u32; 16] {
    let mut words = [0u32; 16];
    for (word, chunk) in words.iter_mut().zip(block.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}

/// Little-endian bytes of a 16-word block.
pub fn words_to_bytes(words: &[u32; 16]) -> [u8; 64] {
    let mut block = [0u8; 64];
    for (chunk, word) in block.chunks_exact_mut(4).zip(words.iter()) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    block
}

/// Apply MD5 padding to the input message.
///
/// # Padding Algorithm (RFC 1321)
///
/// 1. Append a single '1' bit to the message
/// 2. Append '0' bits until message length ≡ 448 (mod 512)
/// 3. Append the original message length as a 64-bit little-endian integer
pub(crate) fn bit_padding(input: &[u8]) -> Vec<u8> {
    let mut padded: Vec<u8> = input.to_vec();
    let bit_length: u64 = (input.len() as u64).wrapping_mul(8);

    padded.push(0x80);
    while padded.len() % 64 != 56 {
        padded.push(0x00);
    }
    padded.extend_from_slice(&bit_length.to_le_bytes());

    padded
}

/// Compute the MD5 hash of a byte slice with the standard IV.
///
/// # Example
///
/// ```rust
/// use md5_tunnel::md5::{hash, to_hex};
///
/// assert_eq!(to_hex(&hash(b"abc")), "900150983cd24fb0d6963f7d28e17f72");
/// ```
pub fn hash(input: &[u8]) -> [u8; 16] {
    hash_with_iv(input, ChainingState::STANDARD)
}

/// Compute the MD5 hash with custom initial values.
///
/// Collisions found over a custom IV only collide under this function with
/// the same IV.
pub fn hash_with_iv(input: &[u8], iv: ChainingState) -> [u8; 16] {
    let padded = bit_padding(input);
    let mut state = iv;

    for chunk in padded.chunks_exact(64) {
        let mut block = [0u8; 64];
        block.copy_from_slice(chunk);
        state = compress(state, &bytes_to_words(&block));
    }

    state.to_le_bytes()
}

/// Convert MD5 hash bytes to a lowercase hexadecimal string.
pub fn to_hex(hash: &[u8; 16]) -> String {
    hash.iter().map(|byte| format!("{:02x}", byte)).collect()
}
