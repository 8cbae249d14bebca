//! # pagescope - Page Load Activity Timeline Engine
//!
//! pagescope turns low-level browser notifications (socket phases, HTTP
//! request lifecycle, script profiler samples) into a quantised, per-URL
//! timeline of activity spans that a view can render incrementally while the
//! page loads.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Host (browser)                          │
//! │  socket/transaction   request lifecycle     script profiler     │
//! └────────┬─────────────────────┬─────────────────────┬────────────┘
//!          │ push                │ push + taps         │ poll
//!          ▼                     ▼                     ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      pagescope (this crate)                     │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Network    │   │   Request    │   │  JsEvent     │         │
//! │  │   Observer   │   │   Observer   │   │  Fetcher     │         │
//! │  └──────┬───────┘   └──────┬───────┘   └──────┬───────┘         │
//! │         └──────────────────┼──────────────────┘                 │
//! │                            ▼ one bracket per tick               │
//! │  ┌──────────────┐   ┌──────────────┐                            │
//! │  │  Scheduler   │──▶│ TimelineModel│──▶ listeners               │
//! │  │  (Manager)   │   │  (batches)   │    (view, export, display) │
//! │  └──────────────┘   └──────────────┘                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! ### Engine
//!
//! - [`model`]: Broadcast aggregator; batches events and tracks the horizon
//! - [`observers`]: Push-based sources sharing one span engine
//!   - `engine`: in-flight span table, quantisation, lifecycle
//!   - `network`: socket and transaction phases
//!   - `request`: cache hits and data availability via pipeline taps
//! - [`profiling`]: Pull-based script activity from the host profiler
//! - [`scheduler`]: "Ask every source, re-arm if any has work"
//! - [`manager`]: Composition root and session lifecycle
//!
//! ### Support
//!
//! - [`domain`]: Event types, resolution, generations and errors
//! - [`clock`]: Real and manual time sources
//! - [`config`]: Session configuration
//!
//! ### Outer Surfaces
//!
//! - [`export`]: Chrome Trace Event Format output
//! - [`display`]: Headless batch printer
//! - [`replay`]: Drives the engine from a recorded session
//! - [`cli`]: Command-line argument parsing
//!
//! ## Time
//!
//! All engine timestamps are microseconds relative to the session anchor.
//! Instantaneous events occupy exactly one resolution bucket; open spans are
//! published provisionally up to the current rounded-up elapsed time and
//! republished until they complete.

pub mod cli;
pub mod clock;
pub mod config;
pub mod display;
pub mod domain;
pub mod export;
pub mod manager;
pub mod model;
pub mod observers;
pub mod profiling;
pub mod replay;
pub mod scheduler;
