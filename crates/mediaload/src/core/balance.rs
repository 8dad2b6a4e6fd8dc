use std::collections::HashMap;

use crate::data::DcId;

/// Requested-but-unanswered bytes per sub-connection of each data center.
#[derive(Debug)]
pub(crate) struct DcBalance {
    sessions: usize,
    loads:    HashMap<DcId, Vec<u64>>,
}

impl DcBalance {
    pub fn new(sessions: usize) -> Self {
        Self {
            sessions: sessions.max(1),
            loads:    HashMap::new(),
        }
    }

    /// Least-loaded sub-connection of `dc_id`; ties go to the lowest index.
    pub fn choose(&mut self, dc_id: DcId) -> usize {
        let loads = self.entry(dc_id);
        let mut best = 0;
        for (session, load) in loads.iter().enumerate() {
            if *load < loads[best] {
                best = session;
            }
        }
        best
    }

    pub fn add(&mut self, dc_id: DcId, session: usize, bytes: u64) {
        if let Some(load) = self.entry(dc_id).get_mut(session) {
            *load += bytes;
        }
    }

    pub fn sub(&mut self, dc_id: DcId, session: usize, bytes: u64) {
        if let Some(load) = self.entry(dc_id).get_mut(session) {
            *load = load.saturating_sub(bytes);
        }
    }

    pub fn loads(&self, dc_id: DcId) -> Vec<u64> {
        self.loads
            .get(&dc_id)
            .cloned()
            .unwrap_or_else(|| vec![0; self.sessions])
    }

    fn entry(&mut self, dc_id: DcId) -> &mut Vec<u64> {
        let sessions = self.sessions;
        self.loads.entry(dc_id).or_insert_with(|| vec![0; sessions])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spreads_over_sessions() {
        let mut balance = DcBalance::new(3);
        let mut chosen = Vec::new();
        for _ in 0..3 {
            let session = balance.choose(2);
            balance.add(2, session, 1000);
            chosen.push(session);
        }
        assert_eq!(chosen, vec![0, 1, 2]);
        assert_eq!(balance.loads(2), vec![1000, 1000, 1000]);
    }

    #[test]
    fn test_release_makes_session_preferred() {
        let mut balance = DcBalance::new(2);
        balance.add(1, 0, 500);
        balance.add(1, 1, 500);
        balance.sub(1, 1, 500);
        assert_eq!(balance.choose(1), 1);
        balance.sub(1, 1, 500);
        assert_eq!(balance.loads(1), vec![500, 0]);
    }

    #[test]
    fn test_data_centers_are_independent() {
        let mut balance = DcBalance::new(2);
        balance.add(1, 0, 10);
        assert_eq!(balance.choose(2), 0);
        assert_eq!(balance.loads(3), vec![0, 0]);
    }
}
