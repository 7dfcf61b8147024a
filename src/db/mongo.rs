use futures::TryStreamExt;
use log::{info, warn};
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime},
    options::{ClientOptions, ServerApi, ServerApiVersion},
    Client, ClientSession, Collection,
};
use std::{collections::HashMap, sync::Arc, time::Duration};

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

const TRIPS: &str = "Trips";
const STOPS: &str = "Stops";
const LOCATIONS: &str = "Locations";
const COST_INDEX: &str = "CostIndex";
const ACTIVITIES: &str = "Activities";
const TRIP_ACTIVITIES: &str = "TripActivities";
const SECTIONS: &str = "ItinerarySections";
const EXCHANGE_RATES: &str = "ExchangeRates";

pub async fn create_mongo_client(uri: &str) -> Result<Arc<Client>> {
    info!("Connecting to MongoDB");

    let mut client_options = ClientOptions::parse(uri).await?;

    client_options.connect_timeout = Some(Duration::from_secs(10));
    client_options.server_selection_timeout = Some(Duration::from_secs(10));
    client_options.max_pool_size = Some(10);
    client_options.min_pool_size = Some(1);

    // Server API v1 (MongoDB 5.0+)
    let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
    client_options.server_api = Some(server_api);

    let client = Client::with_options(client_options)?;

    match client.database("admin").run_command(doc! {"ping": 1}).await {
        Ok(_) => info!("Successfully connected to MongoDB and verified with ping command"),
        Err(e) => {
            warn!("Connected to MongoDB but ping test failed: {}", e);
            warn!("The API may still work, but some functionality might be impaired");
        }
    }

    Ok(Arc::new(client))
}

#[derive(Clone)]
pub struct MongoStore {
    client: Arc<Client>,
    database: String,
}

impl MongoStore {
    pub fn new(client: Arc<Client>, database: &str) -> Self {
        Self {
            client,
            database: database.to_string(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.client.database(&self.database).collection(name)
    }

    fn trips(&self) -> Collection<Trip> {
        self.collection(TRIPS)
    }

    fn stops(&self) -> Collection<TripStop> {
        self.collection(STOPS)
    }

    fn locations(&self) -> Collection<Location> {
        self.collection(LOCATIONS)
    }

    fn cost_index(&self) -> Collection<CostIndexRecord> {
        self.collection(COST_INDEX)
    }

    fn catalog(&self) -> Collection<CatalogActivity> {
        self.collection(ACTIVITIES)
    }

    fn trip_activities(&self) -> Collection<TripActivity> {
        self.collection(TRIP_ACTIVITIES)
    }

    fn sections(&self) -> Collection<ItinerarySection> {
        self.collection(SECTIONS)
    }

    fn rates(&self) -> Collection<CachedRate> {
        self.collection(EXCHANGE_RATES)
    }

    async fn stop_ids(&self, trip_id: &ObjectId) -> Result<Vec<ObjectId>> {
        let stops: Vec<TripStop> = self
            .stops()
            .find(doc! { "trip_id": trip_id })
            .await?
            .try_collect()
            .await?;
        Ok(stops.into_iter().filter_map(|s| s.id).collect())
    }

    async fn catalog_by_id(&self, ids: Vec<ObjectId>) -> Result<HashMap<ObjectId, CatalogActivity>> {
        let catalog: Vec<CatalogActivity> = self
            .catalog()
            .find(doc! { "_id": { "$in": ids } })
            .await?
            .try_collect()
            .await?;
        Ok(catalog
            .into_iter()
            .filter_map(|a| a.id.map(|id| (id, a)))
            .collect())
    }

    /// Runs the mutations, the snapshot reads and the trip update in one transaction.
    async fn commit_in_session(
        &self,
        session: &mut ClientSession,
        trip_id: &ObjectId,
        mutations: Vec<TripMutation>,
    ) -> Result<(Vec<MutationOutcome>, RecalcResult)> {
        if self
            .trips()
            .find_one(doc! { "_id": trip_id })
            .session(&mut *session)
            .await?
            .is_none()
        {
            return Err(Error::not_found("Trip"));
        }

        let mut outcomes = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            outcomes.push(self.apply_in_session(session, trip_id, mutation).await?);
        }

        let snapshot = self.snapshot_in_session(session, trip_id).await?;
        let result = compute_totals(&snapshot);

        self.trips()
            .update_one(
                doc! { "_id": trip_id },
                doc! { "$set": {
                    "transport_total": result.breakdown.transport_total,
                    "accommodation_total": result.breakdown.accommodation_total,
                    "meals_total": result.breakdown.meals_total,
                    "activities_total": result.breakdown.activities_total,
                    "total_budget": result.total,
                    "updated_at": DateTime::now(),
                }},
            )
            .session(&mut *session)
            .await?;

        Ok((outcomes, result))
    }

    async fn require_stop(&self, session: &mut ClientSession, trip_id: &ObjectId, stop_id: &ObjectId) -> Result<()> {
        self.stops()
            .find_one(doc! { "_id": stop_id, "trip_id": trip_id })
            .session(&mut *session)
            .await?
            .map(|_| ())
            .ok_or_else(|| Error::not_found("Stop"))
    }

    async fn stop_ids_in_session(&self, session: &mut ClientSession, trip_id: &ObjectId) -> Result<Vec<TripStop>> {
        let mut cursor = self
            .stops()
            .find(doc! { "trip_id": trip_id })
            .session(&mut *session)
            .await?;
        let stops: Vec<TripStop> = cursor.stream(&mut *session).try_collect().await?;
        Ok(stops)
    }

    async fn apply_in_session(
        &self,
        session: &mut ClientSession,
        trip_id: &ObjectId,
        mutation: TripMutation,
    ) -> Result<MutationOutcome> {
        match mutation {
            TripMutation::AddActivity { trip_stop_id, activity } => {
                self.require_stop(session, trip_id, &trip_stop_id).await?;
                if self
                    .catalog()
                    .find_one(doc! { "_id": activity.activity_id })
                    .session(&mut *session)
                    .await?
                    .is_none()
                {
                    return Err(Error::not_found("Activity"));
                }
                let inserted = self
                    .trip_activities()
                    .insert_one(TripActivity::catalog(trip_stop_id, activity))
                    .session(&mut *session)
                    .await?;
                inserted
                    .inserted_id
                    .as_object_id()
                    .map(MutationOutcome::Created)
                    .ok_or_else(|| Error::Database("Inserted activity has no ObjectId".to_string()))
            }
            TripMutation::AddCustomActivity { trip_stop_id, name, cost } => {
                self.require_stop(session, trip_id, &trip_stop_id).await?;
                let inserted = self
                    .trip_activities()
                    .insert_one(TripActivity::custom(trip_stop_id, name, cost))
                    .session(&mut *session)
                    .await?;
                inserted
                    .inserted_id
                    .as_object_id()
                    .map(MutationOutcome::Created)
                    .ok_or_else(|| Error::Database("Inserted activity has no ObjectId".to_string()))
            }
            TripMutation::UpdateActivity { id, trip_stop_id, patch } => {
                self.require_stop(session, trip_id, &trip_stop_id).await?;
                let updated = self
                    .trip_activities()
                    .update_one(
                        doc! { "_id": id, "trip_stop_id": trip_stop_id },
                        doc! { "$set": {
                            "scheduled_date": patch.scheduled_date,
                            "scheduled_time": patch.scheduled_time,
                            "notes": patch.notes,
                            "actual_cost": patch.actual_cost,
                        }},
                    )
                    .session(&mut *session)
                    .await?;
                if updated.matched_count == 0 {
                    return Err(Error::not_found("Trip activity"));
                }
                Ok(MutationOutcome::Updated(id))
            }
            TripMutation::DeleteActivity { id } => {
                let stop_ids: Vec<ObjectId> = self
                    .stop_ids_in_session(session, trip_id)
                    .await?
                    .into_iter()
                    .filter_map(|s| s.id)
                    .collect();
                let deleted = self
                    .trip_activities()
                    .delete_one(doc! { "_id": id, "trip_stop_id": { "$in": stop_ids } })
                    .session(&mut *session)
                    .await?;
                if deleted.deleted_count == 0 {
                    return Err(Error::not_found("Trip activity"));
                }
                Ok(MutationOutcome::Deleted(id))
            }
            TripMutation::ReplaceSections(sections) => {
                self.sections()
                    .delete_many(doc! { "trip_id": trip_id })
                    .session(&mut *session)
                    .await?;
                let count = sections.len();
                if count > 0 {
                    let sections: Vec<ItinerarySection> =
                        sections.into_iter().map(|s| s.into_section(*trip_id)).collect();
                    self.sections().insert_many(sections).session(&mut *session).await?;
                }
                Ok(MutationOutcome::SectionsReplaced(count))
            }
            TripMutation::ReplaceStops(stops) => {
                let location_ids: Vec<ObjectId> = stops.iter().map(|s| s.location_id).collect();
                let mut cursor = self
                    .locations()
                    .find(doc! { "_id": { "$in": location_ids.clone() } })
                    .session(&mut *session)
                    .await?;
                let known: Vec<ObjectId> = cursor
                    .stream(&mut *session)
                    .try_collect::<Vec<Location>>()
                    .await?
                    .into_iter()
                    .filter_map(|l| l.id)
                    .collect();
                if location_ids.iter().any(|id| !known.contains(id)) {
                    return Err(Error::not_found("Location"));
                }

                let removed: Vec<ObjectId> = self
                    .stop_ids_in_session(session, trip_id)
                    .await?
                    .into_iter()
                    .filter_map(|s| s.id)
                    .collect();
                self.trip_activities()
                    .delete_many(doc! { "trip_stop_id": { "$in": removed } })
                    .session(&mut *session)
                    .await?;
                self.stops()
                    .delete_many(doc! { "trip_id": trip_id })
                    .session(&mut *session)
                    .await?;

                let mut ids = Vec::with_capacity(stops.len());
                let mut documents = Vec::with_capacity(stops.len());
                for new_stop in stops {
                    let id = ObjectId::new();
                    let mut stop = new_stop.into_stop(*trip_id);
                    stop.id = Some(id);
                    ids.push(id);
                    documents.push(stop);
                }
                if !documents.is_empty() {
                    self.stops().insert_many(documents).session(&mut *session).await?;
                }
                Ok(MutationOutcome::StopsReplaced(ids))
            }
        }
    }

    async fn snapshot_in_session(&self, session: &mut ClientSession, trip_id: &ObjectId) -> Result<RecalcSnapshot> {
        let stops = self.stop_ids_in_session(session, trip_id).await?;
        let stop_ids: Vec<ObjectId> = stops.iter().filter_map(|s| s.id).collect();

        let mut cursor = self
            .trip_activities()
            .find(doc! { "trip_stop_id": { "$in": stop_ids } })
            .session(&mut *session)
            .await?;
        let instances: Vec<TripActivity> = cursor.stream(&mut *session).try_collect().await?;

        let catalog_ids: Vec<ObjectId> = instances.iter().filter_map(|a| a.activity_id).collect();
        let mut cursor = self
            .catalog()
            .find(doc! { "_id": { "$in": catalog_ids } })
            .session(&mut *session)
            .await?;
        let catalog: HashMap<ObjectId, Option<f64>> = cursor
            .stream(&mut *session)
            .try_collect::<Vec<CatalogActivity>>()
            .await?
            .into_iter()
            .filter_map(|a| a.id.map(|id| (id, a.estimated_cost)))
            .collect();

        let mut cursor = self
            .sections()
            .find(doc! { "trip_id": trip_id })
            .session(&mut *session)
            .await?;
        let sections: Vec<ItinerarySection> = cursor.stream(&mut *session).try_collect().await?;

        Ok(RecalcSnapshot {
            activity_costs: instances
                .iter()
                .map(|a| {
                    let estimate = a.activity_id.and_then(|id| catalog.get(&id).copied().flatten());
                    effective_cost(a, estimate)
                })
                .collect(),
            stops,
            section_budgets: sections.into_iter().map(|s| s.budget).collect(),
        })
    }
}

impl TripStore for MongoStore {
    async fn trip(&self, trip_id: &ObjectId) -> Result<Option<Trip>> {
        Ok(self.trips().find_one(doc! { "_id": trip_id }).await?)
    }

    async fn create_trip(&self, trip: Trip) -> Result<ObjectId> {
        let inserted = self.trips().insert_one(trip).await?;
        inserted
            .inserted_id
            .as_object_id()
            .ok_or_else(|| Error::Database("Inserted trip has no ObjectId".to_string()))
    }

    async fn user_trips(&self, user_id: &ObjectId) -> Result<Vec<Trip>> {
        Ok(self
            .trips()
            .find(doc! { "user_id": user_id })
            .sort(doc! { "created_at": -1 })
            .await?
            .try_collect()
            .await?)
    }

    async fn set_trip_public(&self, trip_id: &ObjectId, is_public: bool) -> Result<bool> {
        let updated = self
            .trips()
            .update_one(
                doc! { "_id": trip_id },
                doc! { "$set": { "is_public": is_public, "updated_at": DateTime::now() } },
            )
            .await?;
        Ok(updated.matched_count > 0)
    }

    async fn location(&self, location_id: &ObjectId) -> Result<Option<Location>> {
        Ok(self.locations().find_one(doc! { "_id": location_id }).await?)
    }

    async fn stop(&self, stop_id: &ObjectId) -> Result<Option<TripStop>> {
        Ok(self.stops().find_one(doc! { "_id": stop_id }).await?)
    }

    async fn trip_stops(&self, trip_id: &ObjectId) -> Result<Vec<StopWithLocation>> {
        let stops: Vec<TripStop> = self
            .stops()
            .find(doc! { "trip_id": trip_id })
            .sort(doc! { "order_index": 1 })
            .await?
            .try_collect()
            .await?;

        let location_ids: Vec<ObjectId> = stops.iter().map(|s| s.location_id).collect();
        let locations: HashMap<ObjectId, Location> = self
            .locations()
            .find(doc! { "_id": { "$in": location_ids } })
            .await?
            .try_collect::<Vec<Location>>()
            .await?
            .into_iter()
            .filter_map(|l| l.id.map(|id| (id, l)))
            .collect();

        Ok(stops
            .into_iter()
            .filter_map(|stop| {
                let location = locations.get(&stop.location_id)?.clone();
                Some(StopWithLocation { stop, location })
            })
            .collect())
    }

    async fn location_cost(&self, location_id: &ObjectId) -> Result<LocationCost> {
        let record = match self
            .cost_index()
            .find_one(doc! { "location_id": location_id })
            .await
        {
            Ok(record) => record,
            Err(e) => {
                // Structured index may not be populated; fall back to the scalar baseline
                warn!("Cost index read failed for location {}: {}", location_id, e);
                None
            }
        };

        let baseline = self
            .locations()
            .find_one(doc! { "_id": location_id })
            .await?
            .and_then(|l| l.cost_index);

        Ok(LocationCost { baseline, record })
    }

    async fn catalog_activity_costs(&self, trip_id: &ObjectId) -> Result<Vec<CatalogActivityCost>> {
        let stop_ids = self.stop_ids(trip_id).await?;
        let instances: Vec<TripActivity> = self
            .trip_activities()
            .find(doc! { "trip_stop_id": { "$in": stop_ids }, "activity_id": { "$ne": null } })
            .await?
            .try_collect()
            .await?;

        let catalog = self
            .catalog_by_id(instances.iter().filter_map(|a| a.activity_id).collect())
            .await?;

        Ok(instances
            .into_iter()
            .filter_map(|a| {
                let entry = catalog.get(&a.activity_id?)?;
                Some(CatalogActivityCost {
                    trip_stop_id: a.trip_stop_id,
                    cost: a.actual_cost.or(entry.estimated_cost),
                    currency: entry.currency.clone(),
                })
            })
            .collect())
    }

    async fn custom_activity_costs(&self, trip_id: &ObjectId) -> Result<Vec<CustomActivityCost>> {
        let stop_ids = self.stop_ids(trip_id).await?;
        let instances: Vec<TripActivity> = self
            .trip_activities()
            .find(doc! { "trip_stop_id": { "$in": stop_ids }, "activity_id": null })
            .await?
            .try_collect()
            .await?;

        Ok(instances
            .into_iter()
            .map(|a| CustomActivityCost {
                trip_stop_id: a.trip_stop_id,
                cost: a.actual_cost.or(a.custom_cost),
            })
            .collect())
    }

    async fn stop_activities(&self, stop_id: &ObjectId) -> Result<Vec<TripActivity>> {
        Ok(self
            .trip_activities()
            .find(doc! { "trip_stop_id": stop_id })
            .await?
            .try_collect()
            .await?)
    }

    async fn itinerary_sections(&self, trip_id: &ObjectId) -> Result<Vec<ItinerarySection>> {
        Ok(self
            .sections()
            .find(doc! { "trip_id": trip_id })
            .sort(doc! { "order_index": 1 })
            .await?
            .try_collect()
            .await?)
    }

    async fn commit_with_recalc(
        &self,
        trip_id: &ObjectId,
        mutations: Vec<TripMutation>,
    ) -> Result<(Vec<MutationOutcome>, RecalcResult)> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        match self.commit_in_session(&mut session, trip_id, mutations).await {
            Ok(value) => {
                session.commit_transaction().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!("Failed to abort transaction for trip {}: {}", trip_id, abort_err);
                }
                Err(e)
            }
        }
    }
}

impl RateCache for MongoStore {
    async fn cached_rate(&self, base: &str, target: &str) -> Result<Option<CachedRate>> {
        Ok(self
            .rates()
            .find_one(doc! { "base_currency": base, "target_currency": target })
            .await?)
    }

    async fn store_rate(&self, rate: &CachedRate) -> Result<()> {
        self.rates()
            .update_one(
                doc! { "base_currency": &rate.base_currency, "target_currency": &rate.target_currency },
                doc! { "$set": { "rate": rate.rate, "updated_at": rate.updated_at } },
            )
            .upsert(true)
            .await?;
        Ok(())
    }
}
