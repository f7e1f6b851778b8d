//! Batch equivalence by event identity
//!
//! Two fetched batches are the same data when they carry the same set of
//! event IDs. Field contents and order are ignored.

use crate::model::SeismicEvent;

/// True iff both batches hold the same IDs
///
/// Equal cardinality plus pairwise-equal IDs after sorting both sides.
/// Two empty batches are equivalent.
pub fn are_equivalent(batch_a: &[SeismicEvent], batch_b: &[SeismicEvent]) -> bool {
    if batch_a.len() != batch_b.len() {
        return false;
    }

    let mut ids_a: Vec<&str> = batch_a.iter().map(|e| e.id.as_str()).collect();
    let mut ids_b: Vec<&str> = batch_b.iter().map(|e| e.id.as_str()).collect();
    ids_a.sort_unstable();
    ids_b.sort_unstable();

    ids_a == ids_b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use chrono::Utc;

    fn event(id: &str, magnitude: f64) -> SeismicEvent {
        SeismicEvent {
            id: id.to_string(),
            location: GeoPoint::new(0.0, 0.0),
            depth_km: 10.0,
            magnitude,
            time: Utc::now(),
            significance: 0,
            place: String::new(),
            cluster_children: Vec::new(),
        }
    }

    #[test]
    fn test_empty_batches_equivalent() {
        assert!(are_equivalent(&[], &[]));
    }

    #[test]
    fn test_same_batch_equivalent() {
        let batch = vec![event("a", 1.0), event("b", 2.0)];
        assert!(are_equivalent(&batch, &batch));
    }

    #[test]
    fn test_order_independent() {
        let a = vec![event("a", 1.0), event("b", 2.0), event("c", 3.0)];
        let b = vec![event("c", 3.0), event("a", 1.0), event("b", 2.0)];
        assert!(are_equivalent(&a, &b));
    }

    #[test]
    fn test_field_changes_ignored() {
        // Magnitude revisions do not count as new data
        let a = vec![event("a", 4.1)];
        let b = vec![event("a", 4.4)];
        assert!(are_equivalent(&a, &b));
    }

    #[test]
    fn test_different_cardinality() {
        let a = vec![event("a", 1.0)];
        let b = vec![event("a", 1.0), event("b", 1.0)];
        assert!(!are_equivalent(&a, &b));
        assert!(!are_equivalent(&a, &[]));
    }

    #[test]
    fn test_different_ids() {
        let a = vec![event("a", 1.0), event("b", 1.0)];
        let b = vec![event("a", 1.0), event("c", 1.0)];
        assert!(!are_equivalent(&a, &b));
    }
}
