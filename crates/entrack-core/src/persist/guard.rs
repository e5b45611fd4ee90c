use crate::{
    error::InternalError,
    persist::{Command, CommandOutcome, Store},
};
use tracing::{debug, warn};

///
/// TransactionGuard
///
/// Scoped store transaction for one submission.
///
/// The transaction is rolled back when the guard drops without a successful
/// `commit`, including early returns through `?`. Rollback failures are
/// logged, never raised; the original error is what the caller sees.
///

pub(crate) struct TransactionGuard<'s> {
    store: &'s mut dyn Store,
    finished: bool,
}

impl<'s> TransactionGuard<'s> {
    pub(crate) fn begin(store: &'s mut dyn Store) -> Result<Self, InternalError> {
        store.begin()?;

        Ok(Self {
            store,
            finished: false,
        })
    }

    pub(crate) fn execute(&mut self, command: &Command) -> Result<CommandOutcome, InternalError> {
        Ok(self.store.execute(command)?)
    }

    pub(crate) fn commit(mut self) -> Result<(), InternalError> {
        self.store.commit()?;
        self.finished = true;

        Ok(())
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        match self.store.rollback() {
            Ok(()) => debug!("submission rolled back"),
            Err(err) => warn!(error = %err, "rollback after failed submission also failed"),
        }
    }
}
