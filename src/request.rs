// Copyright 2026 Hypermesh Foundation. All rights reserved.
// CloudGrid Simulation Core - Request Entity

use serde::{Deserialize, Serialize};

use crate::types::{FailureReason, GridPos, NodeId, RequestId, RequestState, RequestView, TrafficType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub traffic: TrafficType,
    pub state: RequestState,
    /// Where the current hop started.
    pub origin: GridPos,
    pub target: Option<NodeId>,
    /// Where the current hop ends; cached so rendering survives target removal.
    pub destination: GridPos,
    pub progress: f64,
    pub cached: bool,
    pub hops: u32,
    pub spawned_at: f64,
    /// Set when the request turns terminal; the sweep drops it after this time.
    pub expires_at: Option<f64>,
    pub failure: Option<FailureReason>,
}

impl Request {
    pub fn new(id: RequestId, traffic: TrafficType, origin: GridPos, now: f64) -> Self {
        Self {
            id,
            traffic,
            state: RequestState::Spawned,
            origin,
            target: None,
            destination: origin,
            progress: 0.0,
            cached: false,
            hops: 0,
            spawned_at: now,
            expires_at: None,
            failure: None,
        }
    }

    /// Start a hop from `from` toward node `to` located at `at`.
    pub fn depart(&mut self, from: GridPos, to: NodeId, at: GridPos) {
        self.origin = from;
        self.target = Some(to);
        self.destination = at;
        self.progress = 0.0;
        self.state = RequestState::InTransit;
    }

    /// Advance transit. Returns `true` on the tick the hop finishes.
    pub fn advance(&mut self, dt: f64, speed: f64) -> bool {
        if self.state != RequestState::InTransit {
            return false;
        }
        self.progress = (self.progress + dt * speed).min(1.0);
        self.progress >= 1.0
    }

    pub fn arrive_queued(&mut self) {
        self.state = RequestState::Queued;
        self.origin = self.destination;
        self.hops += 1;
    }

    pub fn start_processing(&mut self) {
        self.state = RequestState::Processing;
    }

    pub fn complete(&mut self, cached: bool, now: f64, grace: f64) {
        self.state = RequestState::Completed;
        self.cached = cached;
        self.expires_at = Some(now + grace);
    }

    pub fn fail(&mut self, reason: FailureReason, now: f64, grace: f64) {
        self.state = RequestState::Failed;
        self.failure = Some(reason);
        self.expires_at = Some(now + grace);
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_expired(&self, now: f64) -> bool {
        self.expires_at.is_some_and(|t| now >= t)
    }

    pub fn view(&self) -> RequestView {
        let (x, z) = match self.state {
            RequestState::InTransit => self.origin.lerp(&self.destination, self.progress),
            _ => (self.destination.x as f64, self.destination.z as f64),
        };
        RequestView {
            id: self.id,
            traffic: self.traffic,
            state: self.state,
            target: self.target,
            progress: self.progress,
            x,
            z,
            cached: self.cached,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request {
        Request::new(RequestId(1), TrafficType::Read, GridPos::new(-10, 0), 0.0)
    }

    #[test]
    fn transit_finishes_after_half_second_at_default_speed() {
        let mut r = request();
        r.depart(GridPos::new(-10, 0), NodeId(1), GridPos::new(0, 0));
        assert!(!r.advance(0.25, 2.0));
        assert!((r.view().x - -5.0).abs() < 1e-9);
        assert!(r.advance(0.25, 2.0));
        r.arrive_queued();
        assert_eq!(r.state, RequestState::Queued);
        assert_eq!(r.hops, 1);
        assert!(!r.advance(1.0, 2.0), "only in-transit requests move");
    }

    #[test]
    fn terminal_expiry_is_tick_relative() {
        let mut r = request();
        r.fail(FailureReason::QueueOverflow, 3.0, 0.5);
        assert!(r.is_terminal());
        assert!(!r.is_expired(3.4));
        assert!(r.is_expired(3.5));
        assert_eq!(r.failure, Some(FailureReason::QueueOverflow));
    }
}
