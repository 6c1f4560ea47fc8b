//! Core types for the Aura automation engine
//!
//! This crate provides the vocabulary shared by every other Aura crate:
//! validated identifier newtypes, the single normalized [`Event`] shape that
//! all inbound signal families are translated into, and the routing keys
//! used to connect events to the automations that care about them.
//!
//! # Key Types
//!
//! - [`Event`] - A normalized inbound signal (sensor, device, clock, zone, solar)
//! - [`EventKey`] - Coarse routing key derived from an event or a trigger
//! - [`DeviceId`], [`ZoneId`], [`SceneId`], [`AutomationId`], [`ActionId`] - Validated identifiers
//! - [`Weekday`] - Day-of-week vocabulary for schedules and recurrence gates

pub mod event;
pub mod ids;
pub mod time;

pub use event::{Event, EventKey, EventSource, SolarKind, ZoneTransition};
pub use ids::{ActionId, AutomationId, DeviceId, IdError, SceneId, ZoneId};
pub use time::Weekday;
