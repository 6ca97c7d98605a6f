//! `epmem-runtime` – per-cycle driving of the episodic memory.
//!
//! Wraps an [`EpisodicEngine`][epmem_memory::EpisodicEngine] in the
//! once-per-decision-cycle protocol the host agent sees.
//!
//! # Modules
//!
//! - [`scheduler`] – [`EpisodicMemory`][scheduler::EpisodicMemory]: records
//!   when the active trigger fires, then runs a navigation command or a
//!   changed cue.
//! - [`trigger`] – the [`RecordTrigger`][trigger::RecordTrigger] trait and
//!   its two policies, output activity and top-activation change.
//! - [`link`] – [`EpmemLink`][link::EpmemLink]: the `^epmem` attribute-path
//!   protocol (`query`, `retrieved`, `command`, `retrieval-count`).
//! - [`clock`] – the injected [`Clock`][clock::Clock] and per-phase
//!   [`CycleTimers`][clock::CycleTimers].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console
//!   logging plus optional OTLP span export.

pub mod clock;
pub mod link;
pub mod scheduler;
pub mod telemetry;
pub mod trigger;

pub use clock::{Clock, CycleTimers, ManualClock, Phase, SystemClock, TimerStat};
pub use link::{EpmemLink, NavCommand};
pub use scheduler::{CycleAction, CycleReport, EpisodicMemory, EpmemStats};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
pub use trigger::{ActivationChangeTrigger, OutputActivityTrigger, RecordTrigger, TriggerContext};
