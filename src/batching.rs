//! Delivery batch formation.
//!
//! Orders are grouped greedily: the earliest-ready unbatched order seeds a
//! batch, then the closest compatible orders join until the batch is full.
//! An order is compatible when its pickup is within the deviation radius of
//! the batch's pickup centroid, its drop-off is within the radius of some
//! drop-off already in the batch, and its ready time is close to the seed's.

use tracing::debug;

use crate::haversine::{centroid, haversine_km, is_valid_location};
use crate::models::{DeliveryBatch, OptimizationCriteria, UnassignedOrder, UnassignedReason};
use crate::traits::Order;

#[derive(Debug, Clone)]
pub struct BatchOutcome<OrderId> {
    pub batches: Vec<DeliveryBatch<OrderId>>,
    /// Orders that could not be batched at all.
    pub rejected: Vec<UnassignedOrder<OrderId>>,
}

/// Group `orders` into delivery batches under `criteria`.
pub fn form_batches<O>(orders: &[O], criteria: &OptimizationCriteria) -> BatchOutcome<O::Id>
where
    O: Order,
{
    let mut rejected = Vec::new();
    let mut pending: Vec<usize> = Vec::with_capacity(orders.len());

    for (index, order) in orders.iter().enumerate() {
        if is_valid_location(order.pickup_location()) && is_valid_location(order.dropoff_location()) {
            pending.push(index);
        } else {
            rejected.push(UnassignedOrder {
                order_id: order.id().clone(),
                reason: UnassignedReason::InvalidLocation,
            });
        }
    }

    // Ties on ready time go to the earlier-placed order, then input order.
    pending.sort_by_key(|&index| (orders[index].ready_at(), orders[index].placed_at()));

    let max_orders = criteria.max_orders_per_batch.max(1);
    let mut batched = vec![false; orders.len()];
    let mut batches = Vec::new();

    for &seed in &pending {
        if batched[seed] {
            continue;
        }
        batched[seed] = true;
        let mut members = vec![seed];

        while members.len() < max_orders {
            let Some(next) = closest_compatible(orders, &pending, &batched, &members, seed, criteria) else {
                break;
            };
            batched[next] = true;
            members.push(next);
        }

        let pickups: Vec<(f64, f64)> = members.iter().map(|&i| orders[i].pickup_location()).collect();
        let batch = DeliveryBatch {
            id: batches.len(),
            order_ids: members.iter().map(|&i| orders[i].id().clone()).collect(),
            pickup_centroid: centroid(&pickups),
            ready_at: members.iter().map(|&i| orders[i].ready_at()).max().unwrap_or_default(),
        };
        debug!(batch = batch.id, orders = members.len(), "formed delivery batch");
        batches.push(batch);
    }

    BatchOutcome { batches, rejected }
}

fn closest_compatible<O>(
    orders: &[O],
    pending: &[usize],
    batched: &[bool],
    members: &[usize],
    seed: usize,
    criteria: &OptimizationCriteria,
) -> Option<usize>
where
    O: Order,
{
    let pickups: Vec<(f64, f64)> = members.iter().map(|&i| orders[i].pickup_location()).collect();
    let pickup_center = centroid(&pickups);
    let seed_ready = orders[seed].ready_at();

    let mut best: Option<(usize, f64)> = None;
    for &candidate in pending {
        if batched[candidate] {
            continue;
        }
        let order = &orders[candidate];
        if (order.ready_at() - seed_ready).abs() > criteria.max_ready_gap_secs {
            continue;
        }

        let pickup_km = haversine_km(order.pickup_location(), pickup_center);
        if pickup_km > criteria.max_deviation_km {
            continue;
        }

        let dropoff_km = members
            .iter()
            .map(|&i| haversine_km(order.dropoff_location(), orders[i].dropoff_location()))
            .fold(f64::INFINITY, f64::min);
        if dropoff_km > criteria.max_deviation_km {
            continue;
        }

        let score = pickup_km + dropoff_km;
        if best.is_none_or(|(_, best_score)| score < best_score) {
            best = Some((candidate, score));
        }
    }

    best.map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct TestOrder {
        id: u32,
        pickup: (f64, f64),
        dropoff: (f64, f64),
        ready_at: i64,
        placed_at: i64,
    }

    impl Order for TestOrder {
        type Id = u32;

        fn id(&self) -> &u32 {
            &self.id
        }

        fn vendor_id(&self) -> &str {
            "vendor"
        }

        fn pickup_location(&self) -> (f64, f64) {
            self.pickup
        }

        fn dropoff_location(&self) -> (f64, f64) {
            self.dropoff
        }

        fn ready_at(&self) -> i64 {
            self.ready_at
        }

        fn delivery_window(&self) -> Option<(i64, i64)> {
            None
        }

        fn placed_at(&self) -> i64 {
            self.placed_at
        }
    }

    // ~0.001 degree latitude is ~111 m.
    fn near(id: u32, offset: f64, ready_at: i64) -> TestOrder {
        TestOrder {
            id,
            pickup: (36.1000 + offset, -115.1700),
            dropoff: (36.1200 + offset, -115.1500),
            ready_at,
            placed_at: 0,
        }
    }

    fn ids(batch: &DeliveryBatch<u32>) -> Vec<u32> {
        batch.order_ids.clone()
    }

    #[test]
    fn test_groups_nearby_orders() {
        let orders = vec![near(1, 0.0, 0), near(2, 0.001, 60), near(3, 0.002, 120)];
        let outcome = form_batches(&orders, &OptimizationCriteria::default());
        assert_eq!(outcome.batches.len(), 1);
        assert_eq!(ids(&outcome.batches[0]), vec![1, 2, 3]);
        assert_eq!(outcome.batches[0].ready_at, 120);
        assert!(outcome.rejected.is_empty());
    }

    #[test]
    fn test_respects_max_orders() {
        let orders: Vec<TestOrder> = (0..5).map(|i| near(i, i as f64 * 0.0005, 0)).collect();
        let criteria = OptimizationCriteria {
            max_orders_per_batch: 2,
            ..OptimizationCriteria::default()
        };
        let outcome = form_batches(&orders, &criteria);
        assert_eq!(outcome.batches.len(), 3);
        assert!(outcome.batches.iter().all(|batch| batch.order_ids.len() <= 2));
        let total: usize = outcome.batches.iter().map(|b| b.order_ids.len()).sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn test_far_pickup_not_batched() {
        let mut far = near(2, 0.0, 0);
        far.pickup = (36.2000, -115.1700); // ~11 km away
        let orders = vec![near(1, 0.0, 0), far];
        let outcome = form_batches(&orders, &OptimizationCriteria::default());
        assert_eq!(outcome.batches.len(), 2);
    }

    #[test]
    fn test_far_dropoff_not_batched() {
        let mut far = near(2, 0.0, 0);
        far.dropoff = (36.0000, -115.3000);
        let orders = vec![near(1, 0.0, 0), far];
        let outcome = form_batches(&orders, &OptimizationCriteria::default());
        assert_eq!(outcome.batches.len(), 2);
    }

    #[test]
    fn test_ready_gap_splits_batches() {
        let orders = vec![near(1, 0.0, 0), near(2, 0.0005, 3600)];
        let outcome = form_batches(&orders, &OptimizationCriteria::default());
        assert_eq!(outcome.batches.len(), 2);
        assert_eq!(ids(&outcome.batches[0]), vec![1]);
    }

    #[test]
    fn test_earliest_ready_seeds_first() {
        let orders = vec![near(1, 0.0, 500), near(2, 0.0005, 100)];
        let outcome = form_batches(&orders, &OptimizationCriteria::default());
        assert_eq!(ids(&outcome.batches[0]), vec![2, 1]);
    }

    #[test]
    fn test_earlier_placed_order_seeds_on_tie() {
        let criteria = OptimizationCriteria {
            max_orders_per_batch: 1,
            ..OptimizationCriteria::default()
        };
        let mut late = near(1, 0.0, 300);
        late.placed_at = 200;
        let mut early = near(2, 0.0005, 300);
        early.placed_at = 50;
        let same = near(3, 0.001, 300);
        let mut same_again = near(4, 0.0015, 300);
        same_again.placed_at = 0;

        let outcome = form_batches(&[late, early, same, same_again], &criteria);
        let seeds: Vec<u32> = outcome.batches.iter().map(|batch| batch.order_ids[0]).collect();
        assert_eq!(seeds, vec![3, 4, 2, 1]);
    }

    #[test]
    fn test_invalid_location_rejected() {
        let mut bad = near(2, 0.0, 0);
        bad.dropoff = (f64::NAN, 0.0);
        let orders = vec![near(1, 0.0, 0), bad];
        let outcome = form_batches(&orders, &OptimizationCriteria::default());
        assert_eq!(outcome.batches.len(), 1);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].order_id, 2);
        assert_eq!(outcome.rejected[0].reason, UnassignedReason::InvalidLocation);
    }

    #[test]
    fn test_empty_input() {
        let orders: Vec<TestOrder> = Vec::new();
        let outcome = form_batches(&orders, &OptimizationCriteria::default());
        assert!(outcome.batches.is_empty());
        assert!(outcome.rejected.is_empty());
    }
}
