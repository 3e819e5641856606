//! Closed enumeration of protocol error codes.
//!
//! The numeric values are part of the durable event format and must never be
//! renumbered: consumers key on them when rebuilding secondary indexes.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrCode {
    NotProtocolData                           = 0x0101,
    InvalidProtocolFormat                     = 0x0102,
    InvalidProtocolParams                     = 0x0103,
    UnknownProtocol                           = 0x0104,
    UnknownOperate                            = 0x0105,
    InvalidTxHash                             = 0x0106,
    TickNotExist                              = 0x0107,
    TickExited                                = 0x0108,
    InsufficientAvailableFunds                = 0x0109,
    InsufficientFreezeFunds                   = 0x010A,
    InsufficientValue                         = 0x010B,
    SignatureNotExist                         = 0x010C,
    SignatureAlreadyUsed                      = 0x010D,
    SignatureNotMatch                         = 0x010E,

    InvalidMint                               = 0x020F,
    MintTickNotFound                          = 0x0210,
    MintTickNotSupportPoW                     = 0x0211,
    MintTickProtocolNoMatch                   = 0x0212,
    MintTickMinted                            = 0x0213,
    MintPoWInvalidHash                        = 0x0214,
    MintPoSInvalidShare                       = 0x0215,
    MintAlreadyMinted                         = 0x0216,
    MintAmountExceedLimit                     = 0x0217,
    MintInvalidBlock                          = 0x0218,
    MintBlockExpires                          = 0x0219,
    MintMaxAmountLessThanSupply               = 0x021A,
    AirdropNoPermission                       = 0x021B,
    AirdropInvalidAmount                      = 0x021C,
    AirdropAmountExceedsRemainSupply          = 0x021D,
    AirdropClaimFailed                        = 0x021E,
    InvalidSignature                          = 0x021F,

    InvalidTickUpdate                         = 0x0320,
    TickProtocolNoMatch                       = 0x0321,
    UpdateMaxSupplyNoPermission               = 0x0322,
    UpdateAmountLessThanSupply                = 0x0323,
    UpdateFailed                              = 0x0324,

    Unknown                                   = 0x0825,

    InvalidStaking                            = 0x0926,
    StakingTickUnsupported                    = 0x0927,
    StakingTickNotExisted                     = 0x0928,
    StakingPoolNotFound                       = 0x0929,
    StakingPoolAlreadyStopped                 = 0x092A,
    StakingPoolIsFulled                       = 0x092B,
    StakingPoolIsEnded                        = 0x092C,
    StakingPoolMaxAmountLessThanCurrentAmount = 0x092D,
    StakeConfigPoolNotMatch                   = 0x092E,
    StakeConfigNoPermission                   = 0x092F,
    UnstakingNoStake                          = 0x0930,
    UnstakingAmountInsufficient               = 0x0931,
    UnstakingNotYetUnlocked                   = 0x0932,
    ProxyUnstakingNotAdmin                    = 0x0933,
    UseRewardsNoStake                         = 0x0934,
    UseRewardsInsufficient                    = 0x0935,
    DposMintPointsTooLow                      = 0x0936,
    PoWShareZero                              = 0x0937
}

impl ErrCode {
    pub fn value(self) -> i32 {
        self as i32
    }
}

/// A protocol-level failure. These are event-local: they end up in the
/// event's `err_code`/`err_reason` and never abort block processing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("error code: {}, message: {}", code.value(), message)]
pub struct ProtocolError {
    code:    ErrCode,
    message: String
}

impl ProtocolError {
    pub fn new(code: ErrCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn code(&self) -> ErrCode {
        self.code
    }

    pub fn code_value(&self) -> i32 {
        self.code.value()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_keep_their_wire_values() {
        assert_eq!(ErrCode::NotProtocolData.value(), 0x0101);
        assert_eq!(ErrCode::SignatureNotMatch.value(), 0x010E);
        assert_eq!(ErrCode::InvalidMint.value(), 0x020F);
        assert_eq!(ErrCode::InvalidSignature.value(), 0x021F);
        assert_eq!(ErrCode::InvalidTickUpdate.value(), 0x0320);
        assert_eq!(ErrCode::UpdateAmountLessThanSupply.value(), 0x0323);
        assert_eq!(ErrCode::Unknown.value(), 0x0825);
        assert_eq!(ErrCode::InvalidStaking.value(), 0x0926);
        assert_eq!(ErrCode::StakingPoolNotFound.value(), 0x0929);
        assert_eq!(ErrCode::PoWShareZero.value(), 0x0937);
    }

    #[test]
    fn display_carries_code_and_message() {
        let err = ProtocolError::new(ErrCode::TickExited, "tick existed");
        assert_eq!(err.to_string(), format!("error code: {}, message: tick existed", 0x0108));
    }
}
