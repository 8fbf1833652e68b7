//! Cadence - workflow automation engine
//!
//! Runs configurable multi-step workflows (notify, assign, create a task,
//! wait, branch) in response to domain events, persisting every step so
//! delayed executions survive restarts.

mod runtime;

#[doc(hidden)]
pub use cadence_core;
#[doc(hidden)]
pub use cadence_runtime;

pub use cadence_core::{
    assert_err, assert_err_variant, assert_notified, assert_ok, assert_task_created,
};

pub use runtime::prelude;
pub use runtime::{Cadence, CadenceBuilder, Engine};
