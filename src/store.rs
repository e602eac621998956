//! Stock store on SQLite
//!
//! Uses parameterized queries for every value. Table and index names are never
//! taken from user input; the few statements that need an identifier quote it
//! with [`quote_ident`].
//!
//! Location scope is passed as `Option<LocationId>` and matched with
//! `(?n IS NULL OR id_shop = ?n)`, so one statement serves both scopes.

use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    LocationId, ProductId, ProductMatch, Scope, StockLevel, StockRecord, VariantId,
    PARENT_VARIANT,
};

/// Result type for database operations
pub type DbResult<T> = rusqlite::Result<T>;

/// Initialize the store schema
///
/// Creates tables if they don't exist:
/// - `product`: catalog entry with product-level barcode and active flag
/// - `product_attribute`: variants with their own barcodes
/// - `product_shop`: per-location active flag
/// - `stock_available`: one stock record per (product, variant, location);
///   variant 0 is the parent aggregate
pub fn init_schema(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS product (
            id_product INTEGER PRIMARY KEY,
            ean13 TEXT NOT NULL DEFAULT '',
            name TEXT NOT NULL DEFAULT '',
            active INTEGER NOT NULL DEFAULT 1
        );

        CREATE INDEX IF NOT EXISTS idx_product_ean13 ON product(ean13);

        CREATE TABLE IF NOT EXISTS product_attribute (
            id_product_attribute INTEGER PRIMARY KEY,
            id_product INTEGER NOT NULL,
            ean13 TEXT NOT NULL DEFAULT '',
            name TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_product_attribute_ean13 ON product_attribute(ean13);
        CREATE INDEX IF NOT EXISTS idx_product_attribute_product ON product_attribute(id_product);

        CREATE TABLE IF NOT EXISTS product_shop (
            id_product INTEGER NOT NULL,
            id_shop INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (id_product, id_shop)
        );

        -- Composite unique key: one record per product/variant/location
        CREATE TABLE IF NOT EXISTS stock_available (
            id_stock_available INTEGER PRIMARY KEY,
            id_product INTEGER NOT NULL,
            id_product_attribute INTEGER NOT NULL DEFAULT 0,
            id_shop INTEGER NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 0,
            physical_quantity INTEGER NOT NULL DEFAULT 0,
            reserved_quantity INTEGER NOT NULL DEFAULT 0,
            UNIQUE (id_product, id_product_attribute, id_shop)
        );

        CREATE INDEX IF NOT EXISTS idx_stock_available_shop ON stock_available(id_shop);
        ",
    )?;

    log::debug!("Stock store schema initialized");
    Ok(())
}

// ── Lookups ────────────────────────────────────────────────────────────────

/// Resolve a barcode to a product/variant
///
/// Variant barcodes win; a product-level barcode resolves to the parent
/// record (variant 0). Among several variants sharing a barcode the lowest
/// variant id is taken.
pub fn find_by_barcode(conn: &Connection, barcode: &str) -> DbResult<Option<ProductMatch>> {
    let variant = conn
        .query_row(
            "SELECT id_product, id_product_attribute
             FROM product_attribute
             WHERE ean13 = ?1
             ORDER BY id_product_attribute
             LIMIT 1",
            params![barcode],
            |row| {
                Ok(ProductMatch {
                    product_id: row.get(0)?,
                    variant_id: row.get(1)?,
                })
            },
        )
        .optional()?;
    if variant.is_some() {
        return Ok(variant);
    }

    conn.query_row(
        "SELECT id_product FROM product WHERE ean13 = ?1 ORDER BY id_product LIMIT 1",
        params![barcode],
        |row| {
            Ok(ProductMatch {
                product_id: row.get(0)?,
                variant_id: PARENT_VARIANT,
            })
        },
    )
    .optional()
}

/// Display name: product name, plus ` - <variant>` for variants
pub fn product_name(
    conn: &Connection,
    product_id: ProductId,
    variant_id: VariantId,
) -> DbResult<String> {
    let row: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT p.name, pa.name
             FROM product p
             LEFT JOIN product_attribute pa
                 ON pa.id_product = p.id_product AND pa.id_product_attribute = ?2
             WHERE p.id_product = ?1",
            params![product_id, variant_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    Ok(match row {
        Some((name, Some(variant))) if !variant.is_empty() => format!("{} - {}", name, variant),
        Some((name, _)) => name,
        None => String::new(),
    })
}

/// Current stock record of a product/variant
///
/// With [`Scope::AllLocations`] the record of the lowest location id is returned.
pub fn current_stock(
    conn: &Connection,
    product_id: ProductId,
    variant_id: VariantId,
    scope: Scope,
) -> DbResult<Option<StockLevel>> {
    conn.query_row(
        "SELECT quantity, physical_quantity, reserved_quantity
         FROM stock_available
         WHERE id_product = ?1 AND id_product_attribute = ?2
           AND (?3 IS NULL OR id_shop = ?3)
         ORDER BY id_shop
         LIMIT 1",
        params![product_id, variant_id, scope.location()],
        |row| Ok(StockLevel::new(row.get(0)?, row.get(1)?, row.get(2)?)),
    )
    .optional()
}

fn read_record(row: &rusqlite::Row<'_>) -> DbResult<StockRecord> {
    Ok(StockRecord {
        product_id: row.get(0)?,
        variant_id: row.get(1)?,
        location_id: row.get(2)?,
        level: StockLevel::new(row.get(3)?, row.get(4)?, row.get(5)?),
    })
}

const RECORD_COLUMNS: &str = "id_product, id_product_attribute, id_shop,
     quantity, physical_quantity, reserved_quantity";

/// All stock records in scope, ordered by product, variant, location
pub fn records_in_scope(conn: &Connection, scope: Scope) -> DbResult<Vec<StockRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS}
         FROM stock_available
         WHERE (?1 IS NULL OR id_shop = ?1)
         ORDER BY id_product, id_product_attribute, id_shop"
    ))?;
    let records = stmt
        .query_map(params![scope.location()], read_record)?
        .collect::<DbResult<Vec<_>>>()?;
    Ok(records)
}

/// Per-location sums over a product's variant records (variant != 0)
///
/// Empty when the product has no variant records in scope.
pub fn variant_sums(
    conn: &Connection,
    product_id: ProductId,
    scope: Scope,
) -> DbResult<Vec<(LocationId, StockLevel)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id_shop, SUM(quantity), SUM(physical_quantity), SUM(reserved_quantity)
         FROM stock_available
         WHERE id_product = ?1 AND id_product_attribute != 0
           AND (?2 IS NULL OR id_shop = ?2)
         GROUP BY id_shop
         ORDER BY id_shop",
    )?;
    let sums = stmt
        .query_map(params![product_id, scope.location()], |row| {
            Ok((
                row.get(0)?,
                StockLevel::new(row.get(1)?, row.get(2)?, row.get(3)?),
            ))
        })?
        .collect::<DbResult<Vec<_>>>()?;
    Ok(sums)
}

// ── Writes ─────────────────────────────────────────────────────────────────

/// Write quantity and physical quantity of a product/variant
///
/// - Single location: upsert; a new record is created with `reserved`,
///   an existing record keeps its reserved quantity.
/// - All locations: update every existing record of the product/variant.
pub fn write_stock(
    conn: &Connection,
    product_id: ProductId,
    variant_id: VariantId,
    scope: Scope,
    quantity: i64,
    physical: i64,
    reserved: i64,
) -> DbResult<usize> {
    match scope {
        Scope::Single(location_id) => {
            let mut stmt = conn.prepare_cached(
                "INSERT INTO stock_available
                 (id_product, id_product_attribute, id_shop,
                  quantity, physical_quantity, reserved_quantity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id_product, id_product_attribute, id_shop) DO UPDATE SET
                     quantity = excluded.quantity,
                     physical_quantity = excluded.physical_quantity",
            )?;
            stmt.execute(params![
                product_id,
                variant_id,
                location_id,
                quantity,
                physical,
                reserved
            ])
        }
        Scope::AllLocations => {
            let mut stmt = conn.prepare_cached(
                "UPDATE stock_available
                 SET quantity = ?3, physical_quantity = ?4
                 WHERE id_product = ?1 AND id_product_attribute = ?2",
            )?;
            stmt.execute(params![product_id, variant_id, quantity, physical])
        }
    }
}

/// Overwrite all three quantities of one record
pub fn set_level(
    conn: &Connection,
    product_id: ProductId,
    variant_id: VariantId,
    location_id: LocationId,
    level: StockLevel,
) -> DbResult<usize> {
    let mut stmt = conn.prepare_cached(
        "UPDATE stock_available
         SET quantity = ?4, physical_quantity = ?5, reserved_quantity = ?6
         WHERE id_product = ?1 AND id_product_attribute = ?2 AND id_shop = ?3",
    )?;
    stmt.execute(params![
        product_id,
        variant_id,
        location_id,
        level.quantity,
        level.physical,
        level.reserved
    ])
}

/// Rewrite the parent record (variant 0) of a product from a fresh SUM over its variants
///
/// Each location in scope gets the sums of its own variant records. Locations
/// without a parent record are left alone. Returns the number of parent records written.
pub fn rederive_parent(conn: &Connection, product_id: ProductId, scope: Scope) -> DbResult<usize> {
    let mut written = 0;
    for (location_id, sums) in variant_sums(conn, product_id, scope)? {
        written += set_level(conn, product_id, PARENT_VARIANT, location_id, sums)?;
    }
    Ok(written)
}

/// Deactivate a product globally and in `product_shop` for the scope
pub fn set_product_inactive(conn: &Connection, product_id: ProductId, scope: Scope) -> DbResult<()> {
    conn.execute(
        "UPDATE product SET active = 0 WHERE id_product = ?1",
        params![product_id],
    )?;
    conn.execute(
        "UPDATE product_shop SET active = 0
         WHERE id_product = ?1 AND (?2 IS NULL OR id_shop = ?2)",
        params![product_id, scope.location()],
    )?;
    Ok(())
}

// ── Consistency queries ────────────────────────────────────────────────────

/// Products that have at least one variant
pub fn products_with_variants(conn: &Connection) -> DbResult<Vec<ProductId>> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT id_product FROM product_attribute ORDER BY id_product")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<DbResult<Vec<_>>>()?;
    Ok(ids)
}

/// Parent record of a product at one location
pub fn parent_record(
    conn: &Connection,
    product_id: ProductId,
    location_id: LocationId,
) -> DbResult<Option<StockLevel>> {
    current_stock(conn, product_id, PARENT_VARIANT, Scope::Single(location_id))
}

/// Records with negative quantity or physical quantity at a location
pub fn negative_records(conn: &Connection, location_id: LocationId) -> DbResult<Vec<StockRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS}
         FROM stock_available
         WHERE (quantity < 0 OR physical_quantity < 0) AND id_shop = ?1
         ORDER BY id_product, id_product_attribute"
    ))?;
    let records = stmt
        .query_map(params![location_id], read_record)?
        .collect::<DbResult<Vec<_>>>()?;
    Ok(records)
}

/// Records where `quantity != physical - reserved` at a location
pub fn unbalanced_records(conn: &Connection, location_id: LocationId) -> DbResult<Vec<StockRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS}
         FROM stock_available
         WHERE quantity != (physical_quantity - reserved_quantity) AND id_shop = ?1
         ORDER BY id_product, id_product_attribute"
    ))?;
    let records = stmt
        .query_map(params![location_id], read_record)?
        .collect::<DbResult<Vec<_>>>()?;
    Ok(records)
}

/// Products active at a location whose parent record has no sellable stock
pub fn active_without_stock(
    conn: &Connection,
    location_id: LocationId,
) -> DbResult<Vec<(ProductId, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT sa.id_product, sa.quantity
         FROM stock_available sa
         JOIN product_shop ps ON sa.id_product = ps.id_product AND sa.id_shop = ps.id_shop
         WHERE sa.id_product_attribute = 0
           AND sa.quantity <= 0
           AND ps.active = 1
           AND sa.id_shop = ?1
         ORDER BY sa.id_product",
    )?;
    let rows = stmt
        .query_map(params![location_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<DbResult<Vec<_>>>()?;
    Ok(rows)
}

/// Variant barcodes used by more than one variant, with their usage count
pub fn duplicate_barcodes(conn: &Connection) -> DbResult<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT ean13, COUNT(*) AS c
         FROM product_attribute
         WHERE ean13 != ''
         GROUP BY ean13
         HAVING c > 1
         ORDER BY ean13",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<DbResult<Vec<_>>>()?;
    Ok(rows)
}

// ── Raw schema primitives (backup/restore) ─────────────────────────────────

/// Quote an identifier for use in DDL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// `CREATE TABLE` statement of a table as stored by SQLite
pub fn table_ddl(conn: &Connection, table: &str) -> DbResult<Option<String>> {
    conn.query_row(
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |row| row.get(0),
    )
    .optional()
}

/// Explicit (named) indexes of a table as `(name, CREATE INDEX ...)`
///
/// Indexes backing PRIMARY KEY/UNIQUE constraints have no SQL and are skipped;
/// they are recreated with the table.
pub fn index_ddl(conn: &Connection, table: &str) -> DbResult<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT name, sql FROM sqlite_master
         WHERE type = 'index' AND tbl_name = ?1 AND sql IS NOT NULL
         ORDER BY name",
    )?;
    let rows = stmt
        .query_map(params![table], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<DbResult<Vec<_>>>()?;
    Ok(rows)
}

/// Names of all user tables
pub fn list_tables(conn: &Connection) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<DbResult<Vec<_>>>()?;
    Ok(names)
}

pub fn rename_table(conn: &Connection, from: &str, to: &str) -> DbResult<()> {
    conn.execute_batch(&format!(
        "ALTER TABLE {} RENAME TO {}",
        quote_ident(from),
        quote_ident(to)
    ))
}

pub fn drop_table(conn: &Connection, table: &str) -> DbResult<()> {
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
}

pub fn drop_index(conn: &Connection, index: &str) -> DbResult<()> {
    conn.execute_batch(&format!("DROP INDEX IF EXISTS {}", quote_ident(index)))
}

/// Execute one raw statement from a backup artifact
pub fn execute_raw(conn: &Connection, sql: &str) -> DbResult<()> {
    conn.execute_batch(sql)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Small builders shared by the unit tests of the reconciliation modules.

    use super::*;

    pub fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    pub fn add_product(conn: &Connection, id: ProductId, ean: &str, name: &str) {
        conn.execute(
            "INSERT INTO product (id_product, ean13, name, active) VALUES (?1, ?2, ?3, 1)",
            params![id, ean, name],
        )
        .unwrap();
    }

    pub fn add_variant(conn: &Connection, id: VariantId, product: ProductId, ean: &str, name: &str) {
        conn.execute(
            "INSERT INTO product_attribute (id_product_attribute, id_product, ean13, name)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, product, ean, name],
        )
        .unwrap();
    }

    pub fn add_shop_row(conn: &Connection, product: ProductId, shop: LocationId, active: bool) {
        conn.execute(
            "INSERT INTO product_shop (id_product, id_shop, active) VALUES (?1, ?2, ?3)",
            params![product, shop, active as i64],
        )
        .unwrap();
    }

    pub fn add_stock(
        conn: &Connection,
        product: ProductId,
        variant: VariantId,
        shop: LocationId,
        quantity: i64,
        physical: i64,
        reserved: i64,
    ) {
        conn.execute(
            "INSERT INTO stock_available
             (id_product, id_product_attribute, id_shop, quantity, physical_quantity, reserved_quantity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![product, variant, shop, quantity, physical, reserved],
        )
        .unwrap();
    }

    pub fn level_of(
        conn: &Connection,
        product: ProductId,
        variant: VariantId,
        shop: LocationId,
    ) -> StockLevel {
        current_stock(conn, product, variant, Scope::Single(shop))
            .unwrap()
            .unwrap()
    }

    pub fn is_active(conn: &Connection, product: ProductId) -> bool {
        conn.query_row(
            "SELECT active FROM product WHERE id_product = ?1",
            params![product],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    pub fn is_active_in_shop(conn: &Connection, product: ProductId, shop: LocationId) -> bool {
        conn.query_row(
            "SELECT active FROM product_shop WHERE id_product = ?1 AND id_shop = ?2",
            params![product, shop],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn init_schema_creates_tables() {
        let conn = test_db();
        for table in ["product", "product_attribute", "product_shop", "stock_available"] {
            assert!(table_exists(&conn, table).unwrap(), "{table} missing");
        }
        assert!(!table_exists(&conn, "stock").unwrap());
    }

    #[test]
    fn init_schema_is_idempotent() {
        let conn = test_db();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn variant_barcode_wins_over_product_barcode() {
        let conn = test_db();
        add_product(&conn, 1, "4000000000001", "Shirt");
        add_product(&conn, 2, "4000000000002", "Mug");
        add_variant(&conn, 10, 2, "4000000000001", "Blue");

        let hit = find_by_barcode(&conn, "4000000000001").unwrap().unwrap();
        assert_eq!(hit.product_id, 2);
        assert_eq!(hit.variant_id, 10);

        let parent = find_by_barcode(&conn, "4000000000002").unwrap().unwrap();
        assert_eq!(parent.product_id, 2);
        assert_eq!(parent.variant_id, PARENT_VARIANT);

        assert!(find_by_barcode(&conn, "999").unwrap().is_none());
    }

    #[test]
    fn product_name_appends_variant() {
        let conn = test_db();
        add_product(&conn, 1, "", "Shirt");
        add_variant(&conn, 10, 1, "", "Size M");
        assert_eq!(product_name(&conn, 1, 10).unwrap(), "Shirt - Size M");
        assert_eq!(product_name(&conn, 1, 0).unwrap(), "Shirt");
        assert_eq!(product_name(&conn, 99, 0).unwrap(), "");
    }

    #[test]
    fn current_stock_respects_scope() {
        let conn = test_db();
        add_stock(&conn, 1, 0, 2, 7, 7, 0);
        add_stock(&conn, 1, 0, 1, 3, 4, 1);

        let single = current_stock(&conn, 1, 0, Scope::Single(2)).unwrap().unwrap();
        assert_eq!(single, StockLevel::new(7, 7, 0));

        let all = current_stock(&conn, 1, 0, Scope::AllLocations).unwrap().unwrap();
        assert_eq!(all, StockLevel::new(3, 4, 1), "lowest location wins");

        assert!(current_stock(&conn, 1, 0, Scope::Single(3)).unwrap().is_none());
    }

    #[test]
    fn write_stock_single_upserts_and_keeps_reserved() {
        let conn = test_db();
        add_stock(&conn, 1, 5, 1, 3, 5, 2);

        write_stock(&conn, 1, 5, Scope::Single(1), 8, 10, 99).unwrap();
        assert_eq!(level_of(&conn, 1, 5, 1), StockLevel::new(8, 10, 2));

        write_stock(&conn, 1, 6, Scope::Single(1), 4, 4, 0).unwrap();
        assert_eq!(level_of(&conn, 1, 6, 1), StockLevel::new(4, 4, 0));
    }

    #[test]
    fn write_stock_all_locations_updates_every_record() {
        let conn = test_db();
        add_stock(&conn, 1, 5, 1, 3, 3, 0);
        add_stock(&conn, 1, 5, 2, 9, 9, 0);

        let written = write_stock(&conn, 1, 5, Scope::AllLocations, 6, 6, 0).unwrap();
        assert_eq!(written, 2);
        assert_eq!(level_of(&conn, 1, 5, 1).physical, 6);
        assert_eq!(level_of(&conn, 1, 5, 2).physical, 6);
    }

    #[test]
    fn rederive_parent_sums_per_location() {
        let conn = test_db();
        add_stock(&conn, 1, 0, 1, 0, 0, 0);
        add_stock(&conn, 1, 10, 1, 2, 3, 1);
        add_stock(&conn, 1, 11, 1, 4, 4, 0);
        add_stock(&conn, 1, 0, 2, 0, 0, 0);
        add_stock(&conn, 1, 10, 2, 1, 1, 0);

        let written = rederive_parent(&conn, 1, Scope::AllLocations).unwrap();
        assert_eq!(written, 2);
        assert_eq!(level_of(&conn, 1, 0, 1), StockLevel::new(6, 7, 1));
        assert_eq!(level_of(&conn, 1, 0, 2), StockLevel::new(1, 1, 0));
    }

    #[test]
    fn rederive_parent_without_variants_is_noop() {
        let conn = test_db();
        add_stock(&conn, 1, 0, 1, 5, 5, 0);
        assert_eq!(rederive_parent(&conn, 1, Scope::Single(1)).unwrap(), 0);
        assert_eq!(level_of(&conn, 1, 0, 1), StockLevel::new(5, 5, 0));
    }

    #[test]
    fn set_product_inactive_scoped_to_location() {
        let conn = test_db();
        add_product(&conn, 1, "", "Shirt");
        add_shop_row(&conn, 1, 1, true);
        add_shop_row(&conn, 1, 2, true);

        set_product_inactive(&conn, 1, Scope::Single(1)).unwrap();
        assert!(!is_active(&conn, 1));
        assert!(!is_active_in_shop(&conn, 1, 1));
        assert!(is_active_in_shop(&conn, 1, 2));
    }

    #[test]
    fn consistency_queries_find_violations() {
        let conn = test_db();
        add_product(&conn, 1, "", "A");
        add_shop_row(&conn, 1, 1, true);
        add_stock(&conn, 1, 0, 1, -1, 0, 1);
        add_stock(&conn, 2, 0, 1, 5, 5, 1);
        add_stock(&conn, 3, 0, 2, -4, -4, 0);
        add_variant(&conn, 10, 1, "123", "");
        add_variant(&conn, 11, 2, "123", "");

        let negatives = negative_records(&conn, 1).unwrap();
        assert_eq!(negatives.len(), 1);
        assert_eq!(negatives[0].product_id, 1);

        let unbalanced = unbalanced_records(&conn, 1).unwrap();
        assert_eq!(unbalanced.len(), 1);
        assert_eq!(unbalanced[0].product_id, 2);

        assert_eq!(active_without_stock(&conn, 1).unwrap(), vec![(1, -1)]);
        assert_eq!(duplicate_barcodes(&conn).unwrap(), vec![("123".to_string(), 2)]);
        assert_eq!(products_with_variants(&conn).unwrap(), vec![1, 2]);
    }

    #[test]
    fn raw_primitives_rename_and_drop() {
        let conn = test_db();
        assert!(table_ddl(&conn, "product")
            .unwrap()
            .unwrap()
            .starts_with("CREATE TABLE product"));
        let indexes = index_ddl(&conn, "product").unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].0, "idx_product_ean13");

        rename_table(&conn, "product", "product_shadow").unwrap();
        assert!(!table_exists(&conn, "product").unwrap());
        assert!(table_exists(&conn, "product_shadow").unwrap());

        drop_table(&conn, "product_shadow").unwrap();
        assert!(!table_exists(&conn, "product_shadow").unwrap());
    }

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("stock"), "\"stock\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
