use super::test_helpers::{
    ScriptedClient, Step, drafts, drain_events, fast_settings, read_failures, spawn_dispatcher,
    token, wait_for_stats,
};
use super::*;
use crate::types::Event;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
