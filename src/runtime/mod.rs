//! Runtime system
//!
//! The node, its runtime objects, the pools backing them and the scheduler
//! that runs tasks on the worker cores.

pub mod action;
pub mod affinity;
pub mod group;
pub mod job;
pub mod memory;
pub mod node;
pub mod plugin;
pub mod queue;
pub mod scheduler;
