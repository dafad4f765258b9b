//! Endpoint XRM-result severity classification (§4.2 `check_ep_result_severity`).
//!
//! Transcribed from ground-truth `Rtm_CheckEpResultSeverity`'s exhaustive switch, generalized
//! the way `frame/error/counters.rs::ThresholdCounter` generalizes a single increment/reset
//! counter into a three-way classifier.

use crate::hal::{InternalFault, ResourceKind, TargetErrorCode, TxFault, XrmFault, XrmResult};
use crate::routing::types::Severity;
use crate::types::MAX_NUM_RETRIES_IN_ERR;

/// Classifies `result`, bumping or resetting `retry_count` as a side effect.
pub fn classify_ep_result(result: XrmResult, retry_count: &mut u8) -> Severity {
    match result {
        XrmResult::SuccessBuild | XrmResult::SuccessDestroy => {
            *retry_count = 0;
            Severity::NoError
        }
        XrmResult::ErrConfig => Severity::Critical,
        XrmResult::ErrBuild(fault) | XrmResult::ErrDestroy(fault) | XrmResult::ErrSync(fault) => {
            classify_fault(fault, retry_count)
        }
    }
}

fn classify_fault(fault: XrmFault, retry_count: &mut u8) -> Severity {
    if *retry_count == MAX_NUM_RETRIES_IN_ERR {
        return Severity::Critical;
    }
    match fault {
        XrmFault::Tx(tx) => classify_tx(tx, retry_count),
        XrmFault::Target(target) => classify_target(&target, retry_count),
        XrmFault::Internal(internal) => classify_internal(internal, retry_count),
    }
}

fn classify_tx(fault: TxFault, retry_count: &mut u8) -> Severity {
    match fault {
        TxFault::CfgNoRcvr | TxFault::FatalOa => Severity::Critical,
        TxFault::Unknown
        | TxFault::FatalWt
        | TxFault::Timeout
        | TxFault::Bf
        | TxFault::Crc
        | TxFault::NaTrans
        | TxFault::Ack
        | TxFault::Id => {
            *retry_count = retry_count.saturating_add(1);
            Severity::Uncritical
        }
    }
}

fn classify_target(target: &crate::hal::TargetFault, retry_count: &mut u8) -> Severity {
    let is_socket_create_race = target.code == TargetErrorCode::ErrSystem
        && target.resource == ResourceKind::NwSocket
        && target.info[0] == 0x04
        && target.info[1] == 0x40;
    if is_socket_create_race {
        *retry_count = retry_count.saturating_add(1);
        return Severity::Uncritical;
    }
    match target.code {
        TargetErrorCode::ErrConfiguration | TargetErrorCode::ErrStandard | TargetErrorCode::ErrSystem => {
            Severity::Critical
        }
        TargetErrorCode::ErrBusy | TargetErrorCode::ErrTimeout | TargetErrorCode::ErrProcessing => {
            *retry_count = retry_count.saturating_add(1);
            Severity::Uncritical
        }
    }
}

fn classify_internal(fault: InternalFault, retry_count: &mut u8) -> Severity {
    match fault {
        InternalFault::NotAvailable
        | InternalFault::NotSupported
        | InternalFault::Param
        | InternalFault::NotInitialized => Severity::Critical,
        InternalFault::BufferOverflow | InternalFault::ApiLocked | InternalFault::InvalidShadow => {
            *retry_count = retry_count.saturating_add(1);
            Severity::Uncritical
        }
    }
}
