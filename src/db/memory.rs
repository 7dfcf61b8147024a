//! In-memory `TripStore` + `RateCache` backing the unit and route tests.
//!
//! A unit of work runs against a copy of the state that replaces the live
//! state only when every step succeeded, so failed writes leave no trace.

use bson::{oid::ObjectId, DateTime};
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::db::store::{effective_cost, MutationOutcome, RateCache, RecalcSnapshot, TripMutation, TripStore};
use crate::error::{Error, Result};
use crate::models::{
    activity::{CatalogActivity, CatalogActivityCost, CustomActivityCost, TripActivity},
    budget::RecalcResult,
    exchange::CachedRate,
    itinerary::ItinerarySection,
    location::{CostIndexRecord, Location, LocationCost},
    trip::{StopWithLocation, Trip, TripStop},
};
use crate::services::recalc_service::compute_totals;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    trips: HashMap<ObjectId, Trip>,
    stops: HashMap<ObjectId, TripStop>,
    locations: HashMap<ObjectId, Location>,
    cost_indexes: HashMap<ObjectId, CostIndexRecord>,
    catalog: HashMap<ObjectId, CatalogActivity>,
    trip_activities: Vec<TripActivity>,
    sections: Vec<ItinerarySection>,
    rates: HashMap<(String, String), CachedRate>,
}

impl MemoryState {
    fn stop_ids_of(&self, trip_id: &ObjectId) -> Vec<ObjectId> {
        self.stops
            .iter()
            .filter(|(_, stop)| stop.trip_id == *trip_id)
            .map(|(id, _)| *id)
            .collect()
    }

    fn activities_of<'a>(&'a self, trip_id: &ObjectId) -> impl Iterator<Item = &'a TripActivity> + 'a {
        let stop_ids = self.stop_ids_of(trip_id);
        self.trip_activities
            .iter()
            .filter(move |a| stop_ids.contains(&a.trip_stop_id))
    }

    fn trip_stop(&self, trip_id: &ObjectId, stop_id: &ObjectId) -> Result<&TripStop> {
        self.stops
            .get(stop_id)
            .filter(|stop| stop.trip_id == *trip_id)
            .ok_or_else(|| Error::not_found("Stop"))
    }

    fn snapshot(&self, trip_id: &ObjectId) -> RecalcSnapshot {
        let activity_costs = self
            .activities_of(trip_id)
            .map(|a| {
                let estimate = a
                    .activity_id
                    .and_then(|id| self.catalog.get(&id))
                    .and_then(|c| c.estimated_cost);
                effective_cost(a, estimate)
            })
            .collect();

        RecalcSnapshot {
            activity_costs,
            stops: self
                .stops
                .values()
                .filter(|s| s.trip_id == *trip_id)
                .cloned()
                .collect(),
            section_budgets: self
                .sections
                .iter()
                .filter(|s| s.trip_id == *trip_id)
                .map(|s| s.budget)
                .collect(),
        }
    }

    fn apply(&mut self, trip_id: &ObjectId, mutation: TripMutation) -> Result<MutationOutcome> {
        match mutation {
            TripMutation::AddActivity { trip_stop_id, activity } => {
                self.trip_stop(trip_id, &trip_stop_id)?;
                if !self.catalog.contains_key(&activity.activity_id) {
                    return Err(Error::not_found("Activity"));
                }
                let id = ObjectId::new();
                let mut instance = TripActivity::catalog(trip_stop_id, activity);
                instance.id = Some(id);
                self.trip_activities.push(instance);
                Ok(MutationOutcome::Created(id))
            }
            TripMutation::AddCustomActivity { trip_stop_id, name, cost } => {
                self.trip_stop(trip_id, &trip_stop_id)?;
                let id = ObjectId::new();
                let mut instance = TripActivity::custom(trip_stop_id, name, cost);
                instance.id = Some(id);
                self.trip_activities.push(instance);
                Ok(MutationOutcome::Created(id))
            }
            TripMutation::UpdateActivity { id, trip_stop_id, patch } => {
                self.trip_stop(trip_id, &trip_stop_id)?;
                let instance = self
                    .trip_activities
                    .iter_mut()
                    .find(|a| a.id == Some(id) && a.trip_stop_id == trip_stop_id)
                    .ok_or_else(|| Error::not_found("Trip activity"))?;
                instance.scheduled_date = patch.scheduled_date;
                instance.scheduled_time = patch.scheduled_time;
                instance.notes = patch.notes;
                instance.actual_cost = patch.actual_cost;
                Ok(MutationOutcome::Updated(id))
            }
            TripMutation::DeleteActivity { id } => {
                let stop_ids = self.stop_ids_of(trip_id);
                let position = self
                    .trip_activities
                    .iter()
                    .position(|a| a.id == Some(id) && stop_ids.contains(&a.trip_stop_id))
                    .ok_or_else(|| Error::not_found("Trip activity"))?;
                self.trip_activities.remove(position);
                Ok(MutationOutcome::Deleted(id))
            }
            TripMutation::ReplaceSections(sections) => {
                self.sections.retain(|s| s.trip_id != *trip_id);
                let count = sections.len();
                for section in sections {
                    let mut section = section.into_section(*trip_id);
                    section.id = Some(ObjectId::new());
                    self.sections.push(section);
                }
                Ok(MutationOutcome::SectionsReplaced(count))
            }
            TripMutation::ReplaceStops(stops) => {
                if stops.iter().any(|s| !self.locations.contains_key(&s.location_id)) {
                    return Err(Error::not_found("Location"));
                }
                let removed = self.stop_ids_of(trip_id);
                self.trip_activities.retain(|a| !removed.contains(&a.trip_stop_id));
                self.stops.retain(|_, stop| stop.trip_id != *trip_id);

                let mut ids = Vec::with_capacity(stops.len());
                for new_stop in stops {
                    let id = ObjectId::new();
                    let mut stop = new_stop.into_stop(*trip_id);
                    stop.id = Some(id);
                    self.stops.insert(id, stop);
                    ids.push(id);
                }
                Ok(MutationOutcome::StopsReplaced(ids))
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every store call fail, simulating a lost database connection.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.check_available()?;
        Ok(self.state.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.check_available()?;
        Ok(self.state.write().unwrap_or_else(|e| e.into_inner()))
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Database("store unavailable".to_string()));
        }
        Ok(())
    }

    fn seed(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_trip(&self, mut trip: Trip) -> ObjectId {
        let id = trip.id.unwrap_or_else(ObjectId::new);
        trip.id = Some(id);
        self.seed().trips.insert(id, trip);
        id
    }

    pub fn insert_stop(&self, mut stop: TripStop) -> ObjectId {
        let id = stop.id.unwrap_or_else(ObjectId::new);
        stop.id = Some(id);
        self.seed().stops.insert(id, stop);
        id
    }

    pub fn insert_location(&self, mut location: Location) -> ObjectId {
        let id = location.id.unwrap_or_else(ObjectId::new);
        location.id = Some(id);
        self.seed().locations.insert(id, location);
        id
    }

    pub fn insert_cost_index(&self, location_id: &ObjectId, mut record: CostIndexRecord) {
        record.location_id = Some(*location_id);
        self.seed().cost_indexes.insert(*location_id, record);
    }

    pub fn insert_catalog_activity(&self, mut activity: CatalogActivity) -> ObjectId {
        let id = activity.id.unwrap_or_else(ObjectId::new);
        activity.id = Some(id);
        self.seed().catalog.insert(id, activity);
        id
    }

    /// Inserts without recalculating the trip totals.
    pub fn insert_trip_activity(&self, mut activity: TripActivity) -> ObjectId {
        let id = activity.id.unwrap_or_else(ObjectId::new);
        activity.id = Some(id);
        self.seed().trip_activities.push(activity);
        id
    }

    pub fn insert_section(&self, mut section: ItinerarySection) -> ObjectId {
        let id = section.id.unwrap_or_else(ObjectId::new);
        section.id = Some(id);
        self.seed().sections.push(section);
        id
    }
}

impl TripStore for MemoryStore {
    async fn trip(&self, trip_id: &ObjectId) -> Result<Option<Trip>> {
        Ok(self.read()?.trips.get(trip_id).cloned())
    }

    async fn create_trip(&self, mut trip: Trip) -> Result<ObjectId> {
        let id = ObjectId::new();
        trip.id = Some(id);
        self.write()?.trips.insert(id, trip);
        Ok(id)
    }

    async fn user_trips(&self, user_id: &ObjectId) -> Result<Vec<Trip>> {
        let mut trips: Vec<Trip> = self
            .read()?
            .trips
            .values()
            .filter(|t| t.user_id == *user_id)
            .cloned()
            .collect();
        trips.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(trips)
    }

    async fn set_trip_public(&self, trip_id: &ObjectId, is_public: bool) -> Result<bool> {
        let mut state = self.write()?;
        let Some(trip) = state.trips.get_mut(trip_id) else {
            return Ok(false);
        };
        trip.is_public = is_public;
        trip.updated_at = Some(DateTime::now());
        Ok(true)
    }

    async fn location(&self, location_id: &ObjectId) -> Result<Option<Location>> {
        Ok(self.read()?.locations.get(location_id).cloned())
    }

    async fn stop(&self, stop_id: &ObjectId) -> Result<Option<TripStop>> {
        Ok(self.read()?.stops.get(stop_id).cloned())
    }

    async fn trip_stops(&self, trip_id: &ObjectId) -> Result<Vec<StopWithLocation>> {
        let state = self.read()?;
        let mut stops: Vec<StopWithLocation> = state
            .stops
            .values()
            .filter(|s| s.trip_id == *trip_id)
            .filter_map(|stop| {
                state.locations.get(&stop.location_id).map(|location| StopWithLocation {
                    stop: stop.clone(),
                    location: location.clone(),
                })
            })
            .collect();
        stops.sort_by_key(|s| s.stop.order_index);
        Ok(stops)
    }

    async fn location_cost(&self, location_id: &ObjectId) -> Result<LocationCost> {
        let state = self.read()?;
        Ok(LocationCost {
            baseline: state.locations.get(location_id).and_then(|l| l.cost_index),
            record: state.cost_indexes.get(location_id).cloned(),
        })
    }

    async fn catalog_activity_costs(&self, trip_id: &ObjectId) -> Result<Vec<CatalogActivityCost>> {
        let state = self.read()?;
        let rows = state
            .activities_of(trip_id)
            .filter_map(|a| {
                let catalog = state.catalog.get(&a.activity_id?)?;
                Some(CatalogActivityCost {
                    trip_stop_id: a.trip_stop_id,
                    cost: a.actual_cost.or(catalog.estimated_cost),
                    currency: catalog.currency.clone(),
                })
            })
            .collect();
        Ok(rows)
    }

    async fn custom_activity_costs(&self, trip_id: &ObjectId) -> Result<Vec<CustomActivityCost>> {
        let state = self.read()?;
        let rows = state
            .activities_of(trip_id)
            .filter(|a| a.activity_id.is_none())
            .map(|a| CustomActivityCost {
                trip_stop_id: a.trip_stop_id,
                cost: a.actual_cost.or(a.custom_cost),
            })
            .collect();
        Ok(rows)
    }

    async fn stop_activities(&self, stop_id: &ObjectId) -> Result<Vec<TripActivity>> {
        Ok(self
            .read()?
            .trip_activities
            .iter()
            .filter(|a| a.trip_stop_id == *stop_id)
            .cloned()
            .collect())
    }

    async fn itinerary_sections(&self, trip_id: &ObjectId) -> Result<Vec<ItinerarySection>> {
        let mut sections: Vec<ItinerarySection> = self
            .read()?
            .sections
            .iter()
            .filter(|s| s.trip_id == *trip_id)
            .cloned()
            .collect();
        sections.sort_by_key(|s| s.order_index);
        Ok(sections)
    }

    async fn commit_with_recalc(
        &self,
        trip_id: &ObjectId,
        mutations: Vec<TripMutation>,
    ) -> Result<(Vec<MutationOutcome>, RecalcResult)> {
        let mut live = self.write()?;
        if !live.trips.contains_key(trip_id) {
            return Err(Error::not_found("Trip"));
        }

        let mut work = live.clone();
        let outcomes = mutations
            .into_iter()
            .map(|mutation| work.apply(trip_id, mutation))
            .collect::<Result<Vec<_>>>()?;

        let result = compute_totals(&work.snapshot(trip_id));
        if let Some(trip) = work.trips.get_mut(trip_id) {
            trip.transport_total = Some(result.breakdown.transport_total);
            trip.accommodation_total = Some(result.breakdown.accommodation_total);
            trip.meals_total = Some(result.breakdown.meals_total);
            trip.activities_total = Some(result.breakdown.activities_total);
            trip.total_budget = Some(result.total);
            trip.updated_at = Some(DateTime::now());
        }

        *live = work;
        Ok((outcomes, result))
    }
}

impl RateCache for MemoryStore {
    async fn cached_rate(&self, base: &str, target: &str) -> Result<Option<CachedRate>> {
        Ok(self
            .read()?
            .rates
            .get(&(base.to_string(), target.to_string()))
            .cloned())
    }

    async fn store_rate(&self, rate: &CachedRate) -> Result<()> {
        self.write()?.rates.insert(
            (rate.base_currency.clone(), rate.target_currency.clone()),
            rate.clone(),
        );
        Ok(())
    }
}
