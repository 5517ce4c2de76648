use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Hard cap on tracked challenges; oldest are evicted past this point so an
/// issuance flood cannot grow the map without bound.
const MAX_TRACKED_CHALLENGES: usize = 10_000;
const EVICT_BATCH: usize = 1_000;

const CHALLENGE_BYTES: usize = 16;

pub struct IssuedChallenge {
    pub challenge: String,
    pub difficulty: u32,
    pub expires_at: i64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    Ok,
    /// Challenge was never issued, or was already pruned.
    Invalid,
    Expired,
    AlreadyUsed,
    Insufficient,
}

struct ChallengeEntry {
    difficulty: u32,
    issued_ts: i64,
    consumed: bool,
}

/// Single-use SHA-256 leading-zero-bits challenges, kept process-local.
pub struct PowService {
    enabled: bool,
    difficulty: u32,
    ttl_seconds: i64,
    challenges: DashMap<String, ChallengeEntry>,
}

impl PowService {
    pub fn new(enabled: bool, difficulty: u32, ttl_seconds: i64) -> Self {
        Self {
            enabled,
            difficulty,
            ttl_seconds,
            challenges: DashMap::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Mint a fresh challenge. `None` when the service is disabled.
    pub fn issue(&self, now: i64) -> Option<IssuedChallenge> {
        if !self.enabled {
            return None;
        }
        self.prune(now);
        let mut bytes = [0u8; CHALLENGE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let challenge = utils::b64_encode(&bytes);
        self.challenges.insert(
            challenge.clone(),
            ChallengeEntry {
                difficulty: self.difficulty,
                issued_ts: now,
                consumed: false,
            },
        );
        Some(IssuedChallenge {
            challenge,
            difficulty: self.difficulty,
            expires_at: now + self.ttl_seconds,
        })
    }

    /// Redeem a challenge. The consumed flag flips false-to-true under the
    /// map shard lock, so concurrent redeemers see exactly one `Ok`.
    pub fn verify(&self, challenge: &str, nonce: &str, now: i64) -> VerifyOutcome {
        if !self.enabled {
            return VerifyOutcome::Ok;
        }
        {
            let Some(mut entry) = self.challenges.get_mut(challenge) else {
                return VerifyOutcome::Invalid;
            };
            if entry.issued_ts + self.ttl_seconds >= now {
                if entry.consumed {
                    return VerifyOutcome::AlreadyUsed;
                }
                let Ok(challenge_bytes) = utils::b64_decode(challenge) else {
                    return VerifyOutcome::Invalid;
                };
                let mut hasher = Sha256::new();
                hasher.update(&challenge_bytes);
                hasher.update(nonce.as_bytes());
                if leading_zero_bits(&hasher.finalize()) < entry.difficulty {
                    return VerifyOutcome::Insufficient;
                }
                entry.consumed = true;
                return VerifyOutcome::Ok;
            }
        }
        // Expired: drop the entry now rather than waiting for the next prune.
        self.challenges.remove(challenge);
        VerifyOutcome::Expired
    }

    /// Drop expired entries; past the cap, evict oldest-by-issue-time.
    fn prune(&self, now: i64) {
        self.challenges
            .retain(|_, entry| entry.issued_ts + self.ttl_seconds >= now);
        if self.challenges.len() <= MAX_TRACKED_CHALLENGES {
            return;
        }
        let mut by_age: Vec<(String, i64)> = self
            .challenges
            .iter()
            .map(|entry| (entry.key().clone(), entry.issued_ts))
            .collect();
        by_age.sort_by_key(|(_, issued_ts)| *issued_ts);
        for (challenge, _) in by_age.into_iter().take(EVICT_BATCH) {
            self.challenges.remove(&challenge);
        }
    }
}

pub fn leading_zero_bits(digest: &[u8]) -> u32 {
    let mut bits = 0;
    for &byte in digest {
        if byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}
