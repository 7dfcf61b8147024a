use bson::oid::ObjectId;

use crate::error::Result;
use crate::models::{
    activity::{CatalogActivityCost, CustomActivityCost, NewTripActivity, TripActivity, TripActivityPatch},
    budget::RecalcResult,
    exchange::CachedRate,
    itinerary::{ItinerarySection, NewSection},
    location::{Location, LocationCost},
    trip::{NewStop, StopWithLocation, Trip, TripStop},
};

/// A write applied together with the total-budget recalculation of its trip.
#[derive(Debug, Clone)]
pub enum TripMutation {
    AddActivity {
        trip_stop_id: ObjectId,
        activity: NewTripActivity,
    },
    AddCustomActivity {
        trip_stop_id: ObjectId,
        name: String,
        cost: f64,
    },
    UpdateActivity {
        id: ObjectId,
        trip_stop_id: ObjectId,
        patch: TripActivityPatch,
    },
    DeleteActivity {
        id: ObjectId,
    },
    ReplaceSections(Vec<NewSection>),
    /// Drops the trip's stops (and the activities attached to them) and inserts the given list.
    ReplaceStops(Vec<NewStop>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Created(ObjectId),
    Updated(ObjectId),
    Deleted(ObjectId),
    SectionsReplaced(usize),
    StopsReplaced(Vec<ObjectId>),
}

/// Consistent view of the inputs to a recalculation, read inside one unit of work.
#[derive(Debug, Clone, Default)]
pub struct RecalcSnapshot {
    /// Effective cost of every activity instance of the trip.
    pub activity_costs: Vec<f64>,
    pub stops: Vec<TripStop>,
    pub section_budgets: Vec<Option<f64>>,
}

/// Persistence collaborator for trips, stops, locations and activities.
pub trait TripStore {
    async fn trip(&self, trip_id: &ObjectId) -> Result<Option<Trip>>;

    async fn create_trip(&self, trip: Trip) -> Result<ObjectId>;

    /// Trips owned by `user_id`, newest first.
    async fn user_trips(&self, user_id: &ObjectId) -> Result<Vec<Trip>>;

    /// `false` when the trip does not exist.
    async fn set_trip_public(&self, trip_id: &ObjectId, is_public: bool) -> Result<bool>;

    async fn location(&self, location_id: &ObjectId) -> Result<Option<Location>>;

    async fn stop(&self, stop_id: &ObjectId) -> Result<Option<TripStop>>;

    /// Stops ordered by `order_index`, each with its resolved location.
    async fn trip_stops(&self, trip_id: &ObjectId) -> Result<Vec<StopWithLocation>>;

    async fn location_cost(&self, location_id: &ObjectId) -> Result<LocationCost>;

    async fn catalog_activity_costs(&self, trip_id: &ObjectId) -> Result<Vec<CatalogActivityCost>>;

    async fn custom_activity_costs(&self, trip_id: &ObjectId) -> Result<Vec<CustomActivityCost>>;

    async fn stop_activities(&self, stop_id: &ObjectId) -> Result<Vec<TripActivity>>;

    async fn itinerary_sections(&self, trip_id: &ObjectId) -> Result<Vec<ItinerarySection>>;

    /// Applies `mutations`, recomputes the trip totals from a snapshot read in the
    /// same unit of work and persists them. Either everything commits or nothing does.
    async fn commit_with_recalc(
        &self,
        trip_id: &ObjectId,
        mutations: Vec<TripMutation>,
    ) -> Result<(Vec<MutationOutcome>, RecalcResult)>;
}

/// Process-wide exchange-rate cache.
pub trait RateCache {
    async fn cached_rate(&self, base: &str, target: &str) -> Result<Option<CachedRate>>;

    /// Upsert on (base, target); last write wins.
    async fn store_rate(&self, rate: &CachedRate) -> Result<()>;
}

/// Effective cost of an instance: the actual cost override, else the catalog
/// estimate for linked activities or the custom cost for free-form ones.
pub fn effective_cost(instance: &TripActivity, catalog_estimate: Option<f64>) -> f64 {
    instance
        .actual_cost
        .or(if instance.activity_id.is_some() {
            catalog_estimate
        } else {
            instance.custom_cost
        })
        .unwrap_or(0.0)
}
