use std::{collections::BTreeSet, net::TcpListener, sync::Mutex};

/// Whether `port` can be bound on all interfaces right now.
fn port_is_free(port: u16) -> bool {
    TcpListener::bind(("0.0.0.0", port)).is_ok()
}

/// Hands out ports for server-style runs from `[base, base + span)`.
///
/// A port stays leased until released, so two runs never get the same port
/// from this allocator even if one of them has not bound it yet.
#[derive(Debug)]
pub struct PortAllocator {
    base: u16,
    span: u16,
    state: Mutex<LeaseState>,
}

#[derive(Debug, Default)]
struct LeaseState {
    leased: BTreeSet<u16>,
    // Rotating start so a just-released port is not immediately handed out again.
    cursor: u16,
}

impl PortAllocator {
    pub fn new(base: u16, span: u16) -> Self {
        Self {
            base,
            span: span.max(1),
            state: Mutex::new(LeaseState::default()),
        }
    }

    pub fn lease(&self) -> anyhow::Result<u16> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("port allocator lock poisoned"))?;

        for step in 0..self.span {
            let offset = (u32::from(state.cursor) + u32::from(step)) % u32::from(self.span);
            let candidate = u32::from(self.base) + offset;
            let Ok(port) = u16::try_from(candidate) else {
                continue;
            };
            if state.leased.contains(&port) {
                continue;
            }
            if !port_is_free(port) {
                continue;
            }
            state.leased.insert(port);
            state.cursor = ((offset + 1) % u32::from(self.span)) as u16;
            return Ok(port);
        }

        anyhow::bail!(
            "no free port in range {}..{}",
            self.base,
            u32::from(self.base) + u32::from(self.span)
        )
    }

    pub fn release(&self, port: u16) {
        if let Ok(mut state) = self.state.lock() {
            state.leased.remove(&port);
        }
    }

    pub fn leased(&self) -> Vec<u16> {
        self.state
            .lock()
            .map(|s| s.leased.iter().copied().collect())
            .unwrap_or_default()
    }
}
