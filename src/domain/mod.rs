//! Domain layer - Core triage logic
//!
//! This module contains the domain entities, the capability traits the core
//! consumes (block devices, mounted filesystems, registry hives, artifact
//! sinks) and the domain services built on top of them.

pub mod entities;
pub mod repositories;
pub mod services;
