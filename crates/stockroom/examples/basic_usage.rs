//! Basic usage example for Stockroom.
//!
//! This example walks through a day at a small practice:
//! - Opening the inventory store
//! - Creating a practice, a location and some stock
//! - Using a treatment kit
//! - Moving stock to a second practice
//! - Turning low stock into a shopping list
//!
//! Run with: cargo run --example basic_usage

use stockroom::{
    Config, Inventory, ItemFilter, KitComponent, MovementFilter, NewItem, NewKit, NewLocation,
    NewPractice, Principal, TransferRequest,
};

#[tokio::main]
async fn main() -> stockroom::Result<()> {
    // Initialize logging for visibility
    tracing_subscriber::fmt::init();

    println!("=== Stockroom Basic Usage Example ===\n");

    // -------------------------------------------------------------------------
    // Step 1: Open the store
    // -------------------------------------------------------------------------
    let storage_path = std::env::temp_dir().join("stockroom-example");
    println!("1. Opening inventory at {}", storage_path.display());

    // No network access needed for this walkthrough
    let config = Config::new(&storage_path).with_barcode_lookup(false);
    let inventory = Inventory::open(config).await?;
    let dentist = Principal::new("dr-okafor");

    // -------------------------------------------------------------------------
    // Step 2: Practice, location and stock
    // -------------------------------------------------------------------------
    println!("2. Setting up the practice...");

    let practice = inventory
        .create_practice(&dentist, NewPractice::named("Harbour Dental"))
        .await?;
    let cupboard = inventory
        .create_location(
            &dentist,
            &practice.id,
            NewLocation {
                name: "Surgery 1 cupboard".into(),
                description: None,
            },
        )
        .await?;

    let gloves = inventory
        .create_item(
            &dentist,
            &practice.id,
            NewItem::new("Nitrile gloves (M)", 12, 6)
                .with_barcode("4006381333931")
                .with_location(cupboard.id.clone()),
        )
        .await?;
    let bibs = inventory
        .create_item(&dentist, &practice.id, NewItem::new("Patient bibs", 40, 10))
        .await?;

    for item in inventory
        .list_items(&dentist, &practice.id, &ItemFilter::default())
        .await?
    {
        println!("   {:<24} {:>4}", item.name, item.quantity);
    }

    // -------------------------------------------------------------------------
    // Step 3: Use a kit
    // -------------------------------------------------------------------------
    println!("\n3. Running four check-ups...");

    let kit = inventory
        .create_kit(
            &dentist,
            &practice.id,
            NewKit {
                name: "Check-up".into(),
                description: None,
                components: vec![
                    KitComponent {
                        item_id: gloves.id.clone(),
                        quantity: 1,
                    },
                    KitComponent {
                        item_id: bibs.id.clone(),
                        quantity: 1,
                    },
                ],
            },
        )
        .await?;
    inventory.use_kit(&dentist, &kit.id, 4).await?;

    // -------------------------------------------------------------------------
    // Step 4: Lend stock to a second site
    // -------------------------------------------------------------------------
    println!("4. Lending gloves to the branch...");

    let branch = inventory
        .create_practice(&dentist, NewPractice::named("Harbour Dental - Hillside"))
        .await?;
    let outcome = inventory
        .transfer_stock(
            &dentist,
            TransferRequest {
                source_item_id: gloves.id.clone(),
                destination_practice_id: branch.id.clone(),
                destination_location_id: None,
                quantity: 3,
                note: Some("Hillside ran out".into()),
            },
        )
        .await?;
    println!(
        "   Main now has {}, Hillside has {}",
        outcome.source.quantity, outcome.destination.quantity
    );

    // -------------------------------------------------------------------------
    // Step 5: Reorder
    // -------------------------------------------------------------------------
    println!("\n5. Building the shopping list...");

    for entry in inventory
        .populate_from_low_stock(&dentist, &practice.id)
        .await?
    {
        println!("   buy {} x {}", entry.quantity, entry.name);
    }

    let history = inventory
        .list_movements(&dentist, &practice.id, &MovementFilter::default())
        .await?;
    println!("\n   {} stock movements recorded", history.len());

    println!("\n=== Done ===");
    Ok(())
}
