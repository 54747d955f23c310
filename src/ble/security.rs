//! Pairing parameters and the failure retry policy.
//!
//! A pairing procedure starts from the configured [`PairingParams`]. When
//! the stack reports a failure, [`classify_failure`] decides whether the
//! procedure can be resubmitted with adjusted parameters or has ended:
//!
//! | Failure               | Next attempt                                  |
//! |-----------------------|-----------------------------------------------|
//! | `AuthRequirements`    | next lower [`SecurityTier`], reduced I/O      |
//! | `OobNotAvailable`     | OOB flag cleared                              |
//! | `EncryptionKeySize`   | max key size flipped to the other extreme     |
//! | `PairingNotSupported` | none                                          |
//! | anything else         | none                                          |

use crate::config::{MAX_PAIRING_RETRIES, SMP_MAX_ENC_KEY_SIZE, SMP_MIN_ENC_KEY_SIZE};

/// Authentication requirement tiers, strongest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SecurityTier {
    NoMitmNoBond,
    NoMitmBond,
    MitmBond,
    SecureConnMitmBond,
}

impl SecurityTier {
    /// The next weaker tier, `None` at the bottom.
    pub fn lower(self) -> Option<SecurityTier> {
        match self {
            SecurityTier::SecureConnMitmBond => Some(SecurityTier::MitmBond),
            SecurityTier::MitmBond => Some(SecurityTier::NoMitmBond),
            SecurityTier::NoMitmBond => Some(SecurityTier::NoMitmNoBond),
            SecurityTier::NoMitmNoBond => None,
        }
    }

    pub fn mitm(self) -> bool {
        matches!(self, SecurityTier::MitmBond | SecurityTier::SecureConnMitmBond)
    }

    pub fn bonding(self) -> bool {
        !matches!(self, SecurityTier::NoMitmNoBond)
    }

    /// SMP AuthReq octet: bonding flags, MITM and SC bits.
    pub fn auth_req(self) -> u8 {
        let mut req = 0u8;
        if self.bonding() {
            req |= 0x01;
        }
        if self.mitm() {
            req |= 0x04;
        }
        if self == SecurityTier::SecureConnMitmBond {
            req |= 0x08;
        }
        req
    }
}

/// SMP I/O capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoCapability {
    DisplayOnly,
    DisplayYesNo,
    KeyboardOnly,
    NoInputNoOutput,
    KeyboardDisplay,
}

/// One pairing attempt's parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PairingParams {
    pub tier: SecurityTier,
    pub io_capability: IoCapability,
    pub oob: bool,
    pub max_key_size: u8,
}

/// SMP pairing failure reasons as reported in `BondComplete`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PairingFailure {
    PasskeyEntryFailed,
    OobNotAvailable,
    AuthRequirements,
    ConfirmValueFailed,
    PairingNotSupported,
    EncryptionKeySize,
    CommandNotSupported,
    UnspecifiedReason,
    RepeatedAttempts,
    InvalidParameters,
    DhKeyCheckFailed,
    NumericComparisonFailed,
    /// Link-layer encryption with a stored key failed.
    EncryptionFailed,
    Other(u8),
}

impl From<u8> for PairingFailure {
    fn from(code: u8) -> Self {
        match code {
            0x01 => PairingFailure::PasskeyEntryFailed,
            0x02 => PairingFailure::OobNotAvailable,
            0x03 => PairingFailure::AuthRequirements,
            0x04 => PairingFailure::ConfirmValueFailed,
            0x05 => PairingFailure::PairingNotSupported,
            0x06 => PairingFailure::EncryptionKeySize,
            0x07 => PairingFailure::CommandNotSupported,
            0x08 => PairingFailure::UnspecifiedReason,
            0x09 => PairingFailure::RepeatedAttempts,
            0x0A => PairingFailure::InvalidParameters,
            0x0B => PairingFailure::DhKeyCheckFailed,
            0x0C => PairingFailure::NumericComparisonFailed,
            other => PairingFailure::Other(other),
        }
    }
}

/// Result status of a pairing procedure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BondStatus {
    Success,
    Failed(PairingFailure),
}

/// Security negotiated on a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SecurityProperties {
    /// MITM-protected (authenticated) keys.
    pub authenticated: bool,
    pub secure_connections: bool,
    pub key_size: u8,
}

/// Long-term key with its diversifier and random value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LtkInfo {
    pub ltk: [u8; 16],
    pub ediv: u16,
    pub rand: [u8; 8],
}

/// Keys distributed during a bonding procedure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BondKeys {
    /// Key the local device distributed (used when we are Peripheral).
    pub local_ltk: Option<LtkInfo>,
    /// Key the peer distributed (used when we are Central).
    pub peer_ltk: Option<LtkInfo>,
    pub peer_irk: Option<[u8; 16]>,
    pub peer_csrk: Option<[u8; 16]>,
}

/// One in-flight pairing procedure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PairingAttempt {
    pub params: PairingParams,
    /// Resubmissions made so far in this procedure.
    pub retries: u8,
    /// Key-size bounds already switched once.
    pub key_size_flipped: bool,
}

impl PairingAttempt {
    pub fn new(params: PairingParams) -> Self {
        Self {
            params,
            retries: 0,
            key_size_flipped: false,
        }
    }
}

/// Verdict of the retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FailureAction {
    /// Resubmit with this attempt.
    Retry(PairingAttempt),
    /// Procedure over; clear security state for the peer.
    Terminal,
}

/// Apply the retry table to a failed attempt.
pub fn classify_failure(attempt: &PairingAttempt, failure: PairingFailure) -> FailureAction {
    if attempt.retries >= MAX_PAIRING_RETRIES {
        return FailureAction::Terminal;
    }

    let mut next = *attempt;
    next.retries += 1;

    match failure {
        PairingFailure::AuthRequirements => match attempt.params.tier.lower() {
            Some(tier) => {
                next.params.tier = tier;
                if !tier.mitm() {
                    next.params.io_capability = IoCapability::NoInputNoOutput;
                }
                FailureAction::Retry(next)
            }
            None => FailureAction::Terminal,
        },
        PairingFailure::OobNotAvailable if attempt.params.oob => {
            next.params.oob = false;
            FailureAction::Retry(next)
        }
        PairingFailure::EncryptionKeySize if !attempt.key_size_flipped => {
            next.params.max_key_size = if attempt.params.max_key_size >= SMP_MAX_ENC_KEY_SIZE {
                SMP_MIN_ENC_KEY_SIZE
            } else {
                SMP_MAX_ENC_KEY_SIZE
            };
            next.key_size_flipped = true;
            FailureAction::Retry(next)
        }
        _ => FailureAction::Terminal,
    }
}
