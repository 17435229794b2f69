//! # Seed Data Generator
//!
//! Populates an in-memory store with demo workshop data and walks the main
//! flows end to end: product registration, sale submission with automatic
//! stock deduction, a bulk abono, and a cancellation.
//!
//! ## Usage
//! ```bash
//! cargo run -p taller-store --bin seed
//!
//! # With store-level debug logging
//! RUST_LOG=taller_store=debug cargo run -p taller-store --bin seed
//! ```

use chrono::Utc;
use taller_core::{allocate, InvoiceLine, MovementType, PaymentType, ProductStock, SaleDraft};
use taller_store::{
    CajaRepository, KardexRepository, MemoryStore, NewKardexEntry, OperationGate, SaleRepository,
};
use tracing_subscriber::EnvFilter;

/// Demo catalogue: (product_id, name, cost cents, price cents, opening stock).
const PRODUCTS: &[(&str, &str, i64, i64, i64)] = &[
    ("filtro-aceite", "Filtro de aceite", 800, 1500, 20),
    ("aceite-10w40", "Aceite 10W-40 1L", 1200, 2200, 30),
    ("bujia-ngk", "Bujía NGK", 400, 900, 50),
    ("pastillas-freno", "Pastillas de freno", 2500, 4500, 12),
    ("banda-distribucion", "Banda de distribución", 3000, 5500, 6),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("🌱 Taller POS Seed Data Generator");
    println!("=================================");
    println!();

    let store = MemoryStore::default();
    let gate = OperationGate::new();
    let kardex = KardexRepository::new(store.clone());
    let sales = SaleRepository::new(store.clone(), gate);
    let caja = CajaRepository::new(store);

    // Products with opening-balance ledger entries
    for &(id, name, cost, price, stock) in PRODUCTS {
        kardex
            .create_product(&ProductStock {
                product_id: id.to_string(),
                name: name.to_string(),
                quantity: 0,
                min_stock: 3,
                unit_cost_cents: cost,
                price_cents: price,
            })
            .await?;
        kardex
            .append(NewKardexEntry::new(
                id,
                MovementType::Inicial,
                stock,
                cost,
                "alta inicial",
            ))
            .await?;
    }
    println!("✓ Seeded {} products with opening stock", PRODUCTS.len());

    // Two pending sales against the same equipment
    let today = Utc::now().date_naive();
    let mut invoice_ids = Vec::new();
    for (client, lines) in [
        ("Ana Torres", vec![("filtro-aceite", 1), ("aceite-10w40", 4)]),
        ("Ana Torres", vec![("bujia-ngk", 4)]),
    ] {
        let number = sales.next_invoice_number(today).await?;
        let mut products = Vec::with_capacity(lines.len());
        for (id, quantity) in lines {
            // Prices come from the live catalogue, not the seed table
            let stock = kardex.stock(id).await?;
            products.push(InvoiceLine {
                product_id: id.to_string(),
                name: stock.name.clone(),
                quantity,
                unit_price_cents: stock.price().cents(),
            });
        }
        let total_cents = products.iter().map(|l| l.line_total_cents()).sum();

        let id = sales
            .submit(SaleDraft {
                invoice_number: number.clone(),
                date: today,
                client_name: client.to_string(),
                equipment_id: "moto-ana".to_string(),
                products,
                total_cents,
                payment_type: PaymentType::Pendiente,
            })
            .await?;
        println!("✓ Sale {number} recorded ({total_cents} cents pending)");
        invoice_ids.push(id);
    }

    // Bulk abono across the equipment's outstanding invoices
    let group = sales
        .outstanding_for_equipment(&["moto-ana".to_string()])
        .await?;
    let plan = allocate(5000, &group.invoices)?;
    let batch_id = sales.apply_plan(&plan).await?;
    println!(
        "✓ Abono batch {batch_id}: {} cents applied, {} cents leftover",
        plan.applied_cents, plan.leftover_cents
    );

    // A drawer movement and a cancellation to round out the historial
    caja.register_retiro(2000, "compra de refacciones").await?;
    sales.cancel(&invoice_ids[1]).await?;
    println!("✓ Retiro recorded, second sale cancelled (stock restored)");

    println!();
    println!("Final stock:");
    for &(id, name, ..) in PRODUCTS {
        let stock = kardex.stock(id).await?;
        let flag = if stock.is_below_min() { "  ⚠ low" } else { "" };
        println!("  {name}: {}{flag}", stock.quantity);
    }

    Ok(())
}
