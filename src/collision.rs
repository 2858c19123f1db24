use crate::block1::Block1Found;
use crate::block2::Block2Found;
use crate::md5::{compress, hash_with_iv, to_hex, words_to_bytes, ChainingState};

/// Two distinct 128-byte messages with the same MD5 digest under `iv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    /// Seed of the generator that produced the collision
    pub seed: u32,
    pub iv: ChainingState,
    /// First message: block 1 followed by block 2
    pub message_1: [u8; 128],
    /// Second message: both companion blocks
    pub message_2: [u8; 128],
    /// Digest words shared by both messages
    pub digest: ChainingState,
}

/// The block MD5 appends to a 128-byte message: a single 1 bit, then the
/// length 1024 in bits.
pub const PADDING_BLOCK_128: [u32; 16] = [0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x400, 0];

fn pack(first: &[u32; 16], second: &[u32; 16]) -> [u8; 128] {
    let mut message = [0u8; 128];
    message[..64].copy_from_slice(&words_to_bytes(first));
    message[64..].copy_from_slice(&words_to_bytes(second));
    message
}

impl Collision {
    /// Pack the blocks of both messages and compute the digest from the
    /// shared IHV.
    pub fn assemble(seed: u32, iv: ChainingState, block1: &Block1Found, block2: &Block2Found) -> Self {
        Self {
            seed,
            iv,
            message_1: pack(&block1.block, &block2.block),
            message_2: pack(&block1.companion, &block2.companion),
            digest: compress(block2.ihv, &PADDING_BLOCK_128),
        }
    }

    /// Hash both messages from scratch and check they differ but collide.
    pub fn verify(&self) -> bool {
        let first = hash_with_iv(&self.message_1, self.iv);
        let second = hash_with_iv(&self.message_2, self.iv);
        self.message_1 != self.message_2 && first == second && first == self.digest_bytes()
    }

    pub fn digest_bytes(&self) -> [u8; 16] {
        self.digest.to_le_bytes()
    }

    pub fn digest_hex(&self) -> String {
        to_hex(&self.digest_bytes())
    }

    /// Byte offsets at which the two messages differ.
    pub fn differing_bytes(&self) -> Vec<usize> {
        self.message_1
            .iter()
            .zip(self.message_2.iter())
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(index, _)| index)
            .collect()
    }
}

/// Published two-block MD5 collision over the standard IV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownCollision {
    /// First block of the first message
    pub block1: [u32; 16],
    /// Second block of the first message
    pub block2: [u32; 16],
    /// First block of the second message
    pub block1_prime: [u32; 16],
    /// Second block of the second message
    pub block2_prime: [u32; 16],
}

/// First collision of Wang et al. ("Collisions for Hash Functions MD4, MD5,
/// HAVAL-128 and RIPEMD", 2004)
pub const WANG_COLLISION_0: KnownCollision = KnownCollision {
    block1: [
        0x2dd31d1, 0xc4eee6c5, 0x69a3d69, 0x5cf9af98, 0x87b5ca2f, 0xab7e4612, 0x3e580440,
        0x897ffbb8, 0x634ad55, 0x2b3f409, 0x8388e483, 0x5a417125, 0xe8255108, 0x9fc9cdf7,
        0xf2bd1dd9, 0x5b3c3780,
    ],
    block2: [
        0xd11d0b96, 0x9c7b41dc, 0xf497d8e4, 0xd555655a, 0xc79a7335, 0xcfdebf0, 0x66f12930,
        0x8fb109d1, 0x797f2775, 0xeb5cd530, 0xbaade822, 0x5c15cc79, 0xddcb74ed, 0x6dd3c55f,
        0xd80a9bb1, 0xe3a7cc35,
    ],
    block1_prime: [
        0x2dd31d1, 0xc4eee6c5, 0x69a3d69, 0x5cf9af98, 0x7b5ca2f, 0xab7e4612, 0x3e580440,
        0x897ffbb8, 0x634ad55, 0x2b3f409, 0x8388e483, 0x5a41f125, 0xe8255108, 0x9fc9cdf7,
        0x72bd1dd9, 0x5b3c3780,
    ],
    block2_prime: [
        0xd11d0b96, 0x9c7b41dc, 0xf497d8e4, 0xd555655a, 0x479a7335, 0xcfdebf0, 0x66f12930,
        0x8fb109d1, 0x797f2775, 0xeb5cd530, 0xbaade822, 0x5c154c79, 0xddcb74ed, 0x6dd3c55f,
        0x580a9bb1, 0xe3a7cc35,
    ],
};

/// Second collision of Wang et al., sharing its first block with
/// [`WANG_COLLISION_0`]
pub const WANG_COLLISION_1: KnownCollision = KnownCollision {
    block1: WANG_COLLISION_0.block1,
    block2: [
        0x313e82d8, 0x5b8f3456, 0xd4ac6dae, 0xc619c936, 0xb4e253dd, 0xfd03da87, 0x6633902,
        0xa0cd48d2, 0x42339fe9, 0xe87e570f, 0x70b654ce, 0x1e0da880, 0xbc2198c6, 0x9383a8b6,
        0x2b65f996, 0x702af76f,
    ],
    block1_prime: WANG_COLLISION_0.block1_prime,
    block2_prime: [
        0x313e82d8, 0x5b8f3456, 0xd4ac6dae, 0xc619c936, 0x34e253dd, 0xfd03da87, 0x6633902,
        0xa0cd48d2, 0x42339fe9, 0xe87e570f, 0x70b654ce, 0x1e0d2880, 0xbc2198c6, 0x9383a8b6,
        0xab65f996, 0x702af76f,
    ],
};

impl KnownCollision {
    /// IHVs of both messages after their first blocks.
    pub fn block1_ihvs(&self) -> (ChainingState, ChainingState) {
        let iv = ChainingState::STANDARD;
        (compress(iv, &self.block1), compress(iv, &self.block1_prime))
    }

    /// Block-wise check that both messages reach the same IHV.
    pub fn verify(&self) -> bool {
        let (ihv, ihv_prime) = self.block1_ihvs();
        compress(ihv, &self.block2) == compress(ihv_prime, &self.block2_prime)
    }

    /// The fixture as a [`Collision`], digest included.
    pub fn to_collision(&self) -> Collision {
        let (ihv, _) = self.block1_ihvs();
        let shared = compress(ihv, &self.block2);
        Collision {
            seed: 0,
            iv: ChainingState::STANDARD,
            message_1: pack(&self.block1, &self.block2),
            message_2: pack(&self.block1_prime, &self.block2_prime),
            digest: compress(shared, &PADDING_BLOCK_128),
        }
    }
}
