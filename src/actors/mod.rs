//! Actor-based sensor bridge
//!
//! Every monitored resource gets its own async task communicating via Tokio
//! channels; tasks are independent, and a failure inside one never stops a
//! sibling.
//!
//! ## Architecture Overview
//!
//! ```text
//!                  ┌─────────────────┐
//!                  │  Bridge (main)  │
//!                  └────────┬────────┘
//!                           │ spawns
//!          ┌──────────┬─────┴─────┬──────────────┐
//!          │          │           │              │
//!   ┌──────▼─────┐ ┌──▼───────┐ ┌─▼──────────┐ ┌─▼──────────┐
//!   │ Poller-1   │ │ Poller-N │ │ Observer-1 │ │ Observer-M │
//!   │ (sensor)   │ │ (sensor) │ │ (alarm)    │ │ (alarm)    │
//!   └──────┬─────┘ └──┬───────┘ └─┬──────────┘ └─┬──────────┘
//!          │          │           │ motion       │ forward
//!          │   reads  │      ┌────▼─────┐        │
//!          │◄─────────┼──────┤ Activity │        │
//!          │          │      │  State   │        │
//!          ▼          ▼      └──────────┘        ▼
//!   ┌────────────────────────────────────────────────┐
//!   │              Telemetry Sink (HTTP)             │
//!   └────────────────────────────────────────────────┘
//! ```
//!
//! ## Task Types
//!
//! - **SensorPollerActor**: fetches a resource at an adaptive interval and
//!   forwards each reading
//! - **AlarmObserverActor**: holds one long-lived observation and dispatches
//!   every pushed notification to its alarm handler
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each actor has an mpsc command channel for control
//!    messages; `Shutdown` is the cancellation signal, checked at every
//!    suspension point
//! 2. **Shared state**: the activity flag flows from the motion observer to
//!    the pollers through a single-writer atomic cell

pub mod messages;
pub mod observer;
pub mod poller;
