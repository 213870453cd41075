//! Gas metering for transaction and block execution.
//!
//! Two meters are live while a transaction executes: the per-tx meter the
//! ante handler installs (always a finite limit) and the block-scope meter
//! owned by the deliver state (unbounded when the consensus parameters say
//! so). Both are driven through the same trait.
//!
//! Exhaustion is signalled with an unwind: [`charge`] raises an
//! [`OutOfGasAbort`] panic payload after the meter lock has been released,
//! and the transaction pipeline catches it at the tx boundary and converts
//! it into [`Error::OutOfGas`]. The unwind never escapes the pipeline.

use std::sync::{Arc, Mutex};

use crate::error::{CResult, Error};

/// Gas is an abstract resource unit charged by handlers to bound computation.
pub type Gas = u64;

/// Unwind payload raised on gas exhaustion, caught at the tx boundary.
#[derive(Clone, Debug)]
pub struct OutOfGasAbort {
    pub descriptor: String,
}

/// A monotonic gas counter with limit enforcement.
pub trait GasMeterT: Send {
    /// Gas recorded so far. May exceed the limit after a failed charge.
    fn gas_consumed(&self) -> Gas;

    /// Gas recorded so far, capped at the limit. This is what gets charged
    /// against the block meter for a transaction that overshot its own.
    fn gas_consumed_to_limit(&self) -> Gas;

    fn limit(&self) -> Gas;

    /// consumed > limit.
    fn is_past_limit(&self) -> bool;

    /// consumed >= limit.
    fn is_out_of_gas(&self) -> bool;

    /// Adds `amount` to the consumed total. The total is recorded before the
    /// limit check, so a transaction that overshoots still reports how much
    /// it burned and the meter reads past-limit afterwards.
    fn try_consume(&mut self, amount: Gas, descriptor: &str) -> CResult<()>;
}

/// Shared meter handle; contexts clone it rather than the meter itself.
pub type SharedGasMeter = Arc<Mutex<dyn GasMeterT>>;

/// A gas meter with a finite limit.
pub struct GasMeter {
    limit: Gas,
    consumed: Gas,
}

impl GasMeter {
    pub fn new(limit: Gas) -> Self {
        Self { limit, consumed: 0 }
    }
}

impl GasMeterT for GasMeter {
    fn gas_consumed(&self) -> Gas {
        self.consumed
    }

    fn gas_consumed_to_limit(&self) -> Gas {
        self.consumed.min(self.limit)
    }

    fn limit(&self) -> Gas {
        self.limit
    }

    fn is_past_limit(&self) -> bool {
        self.consumed > self.limit
    }

    fn is_out_of_gas(&self) -> bool {
        self.consumed >= self.limit
    }

    fn try_consume(&mut self, amount: Gas, descriptor: &str) -> CResult<()> {
        self.consumed = self.consumed.saturating_add(amount);
        if self.consumed > self.limit {
            log::debug!(
                "gas exhausted: {} (consumed {}, limit {})",
                descriptor,
                self.consumed,
                self.limit
            );
            return Err(Error::OutOfGas(descriptor.to_string()));
        }
        Ok(())
    }
}

/// A gas meter without a limit. Used for block meters when the configured
/// block gas is unlimited, and for contexts before the ante handler installs
/// the per-tx meter.
pub struct InfiniteGasMeter {
    consumed: Gas,
}

impl InfiniteGasMeter {
    pub fn new() -> Self {
        Self { consumed: 0 }
    }
}

impl Default for InfiniteGasMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl GasMeterT for InfiniteGasMeter {
    fn gas_consumed(&self) -> Gas {
        self.consumed
    }

    fn gas_consumed_to_limit(&self) -> Gas {
        self.consumed
    }

    fn limit(&self) -> Gas {
        0
    }

    fn is_past_limit(&self) -> bool {
        false
    }

    fn is_out_of_gas(&self) -> bool {
        false
    }

    fn try_consume(&mut self, amount: Gas, _descriptor: &str) -> CResult<()> {
        self.consumed = self.consumed.saturating_add(amount);
        Ok(())
    }
}

pub fn finite_meter(limit: Gas) -> SharedGasMeter {
    Arc::new(Mutex::new(GasMeter::new(limit)))
}

pub fn infinite_meter() -> SharedGasMeter {
    Arc::new(Mutex::new(InfiniteGasMeter::new()))
}

/// Charges `amount` against a shared meter, aborting via unwind on
/// exhaustion. The panic is raised after the guard drops so the meter lock
/// is never poisoned by gas control flow.
pub fn charge(meter: &SharedGasMeter, amount: Gas, descriptor: &str) {
    let res = meter
        .lock()
        .expect("gas meter mutex poisoned")
        .try_consume(amount, descriptor);
    if let Err(Error::OutOfGas(descriptor)) = res {
        std::panic::panic_any(OutOfGasAbort { descriptor });
    }
}
