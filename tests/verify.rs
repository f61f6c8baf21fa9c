use patload::{verify, Catalog, MemoryWarehouse, VerifyStatus};

const COUNTRY: &str = "tls801_country";
const NUTS: &str = "tls904_nuts";

fn two_table_catalog() -> Catalog {
    let mut catalog = Catalog::patstat();
    catalog.restrict_to(&[COUNTRY.to_string(), NUTS.to_string()]);
    catalog
}

#[tokio::test]
async fn test_verify_classifies_each_table() -> Result<(), Box<dyn std::error::Error>> {
    let warehouse = MemoryWarehouse::new();
    // 242 is exactly what the builtin catalog expects for tls801_country;
    // tls904_nuts is never created at all.
    warehouse.set_rows(COUNTRY, 242);

    let results = verify::verify(&warehouse, &two_table_catalog()).await?;
    assert_eq!(results.len(), 2);

    let country = results.iter().find(|r| r.table == COUNTRY).unwrap();
    assert_eq!(country.status, VerifyStatus::Ok { rows: 242 });
    assert_eq!(country.to_string(), "tls801_country: OK (242 rows)");

    let nuts = results.iter().find(|r| r.table == NUTS).unwrap();
    assert_eq!(nuts.status, VerifyStatus::NotFound);
    assert_eq!(nuts.to_string(), "tls904_nuts: NOT FOUND");
    Ok(())
}

#[tokio::test]
async fn test_verify_reports_empty_tables() -> Result<(), Box<dyn std::error::Error>> {
    let warehouse = MemoryWarehouse::new();
    warehouse.set_rows(COUNTRY, 0);
    warehouse.set_rows(NUTS, 0);

    let results = verify::verify(&warehouse, &two_table_catalog()).await?;
    assert!(results.iter().all(|r| r.status == VerifyStatus::Empty));
    Ok(())
}

#[tokio::test]
async fn test_verify_reports_partial_loads() -> Result<(), Box<dyn std::error::Error>> {
    let warehouse = MemoryWarehouse::new();
    warehouse.set_rows(COUNTRY, 121);

    let mut catalog = Catalog::patstat();
    catalog.restrict_to(&[COUNTRY.to_string()]);

    let results = verify::verify(&warehouse, &catalog).await?;
    assert_eq!(
        results[0].status,
        VerifyStatus::Partial {
            actual: 121,
            expected: 242
        }
    );
    assert_eq!(
        results[0].to_string(),
        "tls801_country: PARTIAL (121 of 242 rows, 50.0%)"
    );
    Ok(())
}

#[tokio::test]
async fn test_verify_flags_double_loaded_tables() -> Result<(), Box<dyn std::error::Error>> {
    let warehouse = MemoryWarehouse::new();
    warehouse.set_rows(COUNTRY, 484);

    let mut catalog = Catalog::patstat();
    catalog.restrict_to(&[COUNTRY.to_string()]);

    let results = verify::verify(&warehouse, &catalog).await?;
    match results[0].status {
        VerifyStatus::Partial { actual, expected } => {
            assert_eq!(actual, 484);
            assert_eq!(expected, 242);
        }
        other => panic!("expected Partial, got {other:?}"),
    }
    assert!(results[0].to_string().contains("200.0%"));
    Ok(())
}

#[tokio::test]
async fn test_verify_walks_catalog_in_name_order() -> Result<(), Box<dyn std::error::Error>> {
    let warehouse = MemoryWarehouse::new();
    let results = verify::verify(&warehouse, &two_table_catalog()).await?;
    let names: Vec<&str> = results.iter().map(|r| r.table.as_str()).collect();
    assert_eq!(names, vec![COUNTRY, NUTS]);
    Ok(())
}
