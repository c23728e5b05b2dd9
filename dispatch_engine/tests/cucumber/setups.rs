use cucumber::given;
use dispatch_engine::{
    db_types::RiderStatus,
    test_utils::seed::{ikeja_pickup, seed_merchant, seed_product, seed_rider},
};

use crate::cucumber::{dispatch_world::DispatchSystem, DispatchWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut DispatchWorld) {
    let system = DispatchSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "a merchant {string} with a pickup location")]
async fn merchant(world: &mut DispatchWorld, name: String) {
    let system = world.system_mut();
    let merchant = seed_merchant(&system.db, &name, Some(ikeja_pickup())).await;
    system.merchant = Some(merchant);
}

#[given(expr = "the product {string} at ₦{int} retail, ₦{int} wholesale with {int} in stock")]
async fn product(world: &mut DispatchWorld, name: String, retail: i64, wholesale: i64, stock: i64) {
    let system = world.system_mut();
    let merchant_id = system.merchant().id;
    let product = seed_product(&system.db, merchant_id, &name, retail, wholesale, stock).await;
    system.products.insert(name, product);
}

#[given(expr = "{word} is a rider who is {word}")]
async fn rider(world: &mut DispatchWorld, name: String, status: String) {
    let status = status.to_uppercase().parse::<RiderStatus>().expect("Not a rider status");
    let system = world.system_mut();
    let phone = format!("+2348050000{:03}", system.riders.len() + 1);
    let rider = seed_rider(&system.db, &name, &phone, status).await;
    system.riders.insert(name, rider);
}
