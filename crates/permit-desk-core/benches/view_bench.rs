use criterion::{criterion_group, criterion_main, Criterion};
use permit_desk_core::audit_log::{decode, encode};
use permit_desk_core::{
    ApplicationRecord, AuditEntry, CollectionAggregator, FilterSpec, PageSpec, PermitDomain,
    SortSpec,
};
use time::macros::date;

const VEHICLES: [&str; 4] = ["Tricycle", "E-Trike", "Pedicab", "Kuliglig"];
const STATUSES: [&str; 4] = ["pending", "under_review", "approved", "rejected"];

fn mk_record(index: usize) -> ApplicationRecord {
    ApplicationRecord::new(format!("FR-{index:05}"), STATUSES[index % STATUSES.len()])
        .with_created_at(format!("2024-{:02}-{:02} 08:30:00", index % 12 + 1, index % 28 + 1))
        .with_field("first_name", format!("Driver{index}"))
        .with_field("last_name", if index % 3 == 0 { "Santos" } else { "Reyes" })
        .with_field("barangay", format!("Barangay {}", index % 17))
        .with_field("route", format!("Route {}", index % 9))
        .with_field("vehicle_type", VEHICLES[index % VEHICLES.len()])
}

fn bench_view(c: &mut Criterion) {
    let records = (0..5_000).map(mk_record).collect::<Vec<_>>();
    let aggregator = CollectionAggregator::for_domain(PermitDomain::Franchise);
    let filter = FilterSpec {
        search_term: "santos".to_string(),
        category_key: "tricycle".to_string(),
        ..FilterSpec::default()
    };
    let sort = SortSpec::ascending("last_name");
    let page = PageSpec { page: 3, page_size: 25 };

    c.bench_function("franchise_view_5000_records", |b| {
        b.iter(|| {
            let view = aggregator.view(&records, &filter, &sort, &page, date!(2024 - 12 - 31));
            if view.total_count == 0 {
                panic!("view benchmark matched no records");
            }
        });
    });
}

fn bench_audit_decode(c: &mut Criterion) {
    let blob = (0..500).fold(String::new(), |blob, index| {
        encode(&blob, &AuditEntry::new("Jan 2, 2024, 9:00:00 AM", "Bench", format!("note {index}")))
    });

    c.bench_function("audit_decode_500_entries", |b| {
        b.iter(|| {
            let entries = decode(&blob);
            if entries.len() != 500 {
                panic!("audit benchmark decoded {} entries", entries.len());
            }
        });
    });
}

criterion_group!(view_benches, bench_view, bench_audit_decode);
criterion_main!(view_benches);
