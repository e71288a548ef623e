//! Automatic load shedding.
//!
//! When the watched node draws more than the power limit, the shedder asks
//! for its device to be switched off. It asks once per over-limit episode;
//! the episode ends at the first reading back under the limit.

use serde::Serialize;
use tracing::info;

use crate::alert::Advisory;
use crate::reading::Node;

/// A relay command requested by the shedder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShedAction {
    pub device: String,
    pub on: bool,
}

/// Edge-triggered shedding state machine.
#[derive(Debug, Clone)]
pub struct Shedder {
    device: String,
    watch: Node,
    engaged: bool,
}

impl Shedder {
    /// Sheds `device` when `watch` exceeds the power limit.
    pub fn new(device: impl Into<String>, watch: Node) -> Self {
        Self {
            device: device.into(),
            watch,
            engaged: false,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// `true` while an over-limit episode is in progress.
    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    /// Decides on this cycle's advisory.
    ///
    /// `None` means the cycle produced no data: nothing is sent and the
    /// episode state is left alone.
    pub fn decide(&mut self, advisory: Option<&Advisory>) -> Option<ShedAction> {
        let advisory = advisory?;
        let over = advisory.power_limit_exceeded(self.watch);
        match (over, self.engaged) {
            (true, false) => {
                self.engaged = true;
                info!(device = %self.device, node = %self.watch, "power limit exceeded, shedding");
                Some(ShedAction {
                    device: self.device.clone(),
                    on: false,
                })
            }
            (false, true) => {
                self.engaged = false;
                info!(node = %self.watch, "power back under limit");
                None
            }
            _ => None,
        }
    }

    /// Forgets the current episode so the next over-limit cycle asks again.
    /// Used when the shed command could not be delivered.
    pub fn disengage(&mut self) {
        self.engaged = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AdvisoryState, Fault};

    fn over() -> Advisory {
        Advisory {
            state: AdvisoryState::Warning,
            faults: vec![Fault::PowerLimit {
                node: Node::Main,
                watts: 3_500.0,
            }],
        }
    }

    #[test]
    fn sheds_once_per_episode() {
        let mut s = Shedder::new("non_essential", Node::Main);
        let healthy = Advisory::healthy();
        let seq = [&over(), &over(), &healthy, &over()];
        let actions: Vec<_> = seq.iter().map(|a| s.decide(Some(a))).collect();
        assert_eq!(
            actions,
            vec![
                Some(ShedAction {
                    device: "non_essential".into(),
                    on: false
                }),
                None,
                None,
                Some(ShedAction {
                    device: "non_essential".into(),
                    on: false
                }),
            ]
        );
    }

    #[test]
    fn no_data_never_sheds_and_keeps_episode() {
        let mut s = Shedder::new("relay_1", Node::Main);
        assert_eq!(s.decide(None), None);
        assert!(s.decide(Some(&over())).is_some());
        assert_eq!(s.decide(None), None);
        assert!(s.is_engaged());
        assert_eq!(s.decide(Some(&over())), None);
    }

    #[test]
    fn other_nodes_do_not_trigger() {
        let mut s = Shedder::new("relay_1", Node::Essential);
        assert_eq!(s.decide(Some(&over())), None);
    }

    #[test]
    fn disengage_rearms() {
        let mut s = Shedder::new("relay_1", Node::Main);
        assert!(s.decide(Some(&over())).is_some());
        s.disengage();
        assert!(s.decide(Some(&over())).is_some());
    }
}
