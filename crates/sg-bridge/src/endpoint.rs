//! One connection known to the bridge.

use std::sync::Arc;

use sg_core::now_millis;

use crate::transport::Transport;

/// Role an endpoint settles into after a successful bind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Unknown,
    Controller,
    App,
}

pub struct Endpoint {
    pub id: String,
    pub role: Role,
    /// Exclusively owned by the bridge; only the bridge sends or closes.
    pub transport: Arc<dyn Transport>,
    pub last_active: u64,
}

impl Endpoint {
    pub fn new(id: String, role: Role, transport: Arc<dyn Transport>) -> Self {
        Self {
            id,
            role,
            transport,
            last_active: now_millis(),
        }
    }

    pub fn touch(&mut self) {
        self.last_active = now_millis();
    }
}
