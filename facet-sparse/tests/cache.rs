use std::sync::Arc;

use facet::Facet;
use facet_sparse::{CacheStats, KeyOrder, SparseConfig, SparseFormatter};
use facet_testhelpers::test;

#[derive(Facet)]
struct Book {
    title: String,
    author: String,
    year: u16,
    pages: u32,
}

#[derive(Facet)]
struct Film {
    title: String,
    minutes: u32,
}

fn book() -> Book {
    Book {
        title: "Notes".to_string(),
        author: "Ada".to_string(),
        year: 1843,
        pages: 66,
    }
}

fn film() -> Film {
    Film {
        title: "Metropolis".to_string(),
        minutes: 153,
    }
}

#[test]
fn repeated_requests_reuse_one_formatter() {
    let formatter = SparseFormatter::new();
    for _ in 0..5 {
        formatter.format(&book(), &["title", "year"]).unwrap();
    }
    assert_eq!(
        formatter.stats(),
        CacheStats {
            builders: 1,
            formatters: 1,
            builder_compiles: 1,
            formatter_compiles: 1,
            hits: 4,
            evictions: 0,
        }
    );

    let first = formatter.formatter_for(Book::SHAPE, &["title", "year"]).unwrap();
    let second = formatter.formatter_for(Book::SHAPE, &["title", "year"]).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn each_type_gets_its_own_formatters() {
    let formatter = SparseFormatter::new();
    formatter.format(&book(), &["title"]).unwrap();
    formatter.format(&film(), &["title"]).unwrap();

    let book_formatter = formatter.formatter_for(Book::SHAPE, &["title"]).unwrap();
    let film_formatter = formatter.formatter_for(Film::SHAPE, &["title"]).unwrap();
    assert!(!Arc::ptr_eq(&book_formatter, &film_formatter));
    assert_eq!(book_formatter.shape().id, Book::SHAPE.id);
    assert_eq!(film_formatter.shape().id, Film::SHAPE.id);

    let stats = formatter.stats();
    assert_eq!(stats.builders, 2);
    assert_eq!(stats.formatters, 2);
}

#[test]
fn canonical_keys_share_permutations() {
    let formatter = SparseFormatter::new();
    formatter.format(&book(), &["title", "year"]).unwrap();
    formatter.format(&book(), &["year", "title"]).unwrap();

    let stats = formatter.stats();
    assert_eq!(stats.formatters, 1);
    assert_eq!(stats.formatter_compiles, 1);
    assert_eq!(stats.hits, 1);
}

#[test]
fn as_requested_keys_keep_permutations_apart() {
    let formatter =
        SparseFormatter::with_config(SparseConfig::new().key_order(KeyOrder::AsRequested));
    formatter.format(&book(), &["title", "year"]).unwrap();
    formatter.format(&book(), &["year", "title"]).unwrap();

    let stats = formatter.stats();
    assert_eq!(stats.formatters, 2);
    assert_eq!(stats.formatter_compiles, 2);
    assert_eq!(stats.hits, 0);
}

#[test]
fn failed_builds_are_not_cached() {
    let formatter = SparseFormatter::new();
    for _ in 0..3 {
        assert!(formatter.format(&book(), &["isbn"]).is_err());
    }
    let stats = formatter.stats();
    assert_eq!(stats.formatters, 0);
    assert_eq!(stats.formatter_compiles, 0);
    assert_eq!(stats.builder_compiles, 1);

    formatter.format(&book(), &["pages"]).unwrap();
    assert_eq!(formatter.stats().formatters, 1);
}

#[test]
fn least_recently_used_formatter_is_evicted() {
    let formatter = SparseFormatter::with_config(SparseConfig::new().formatter_capacity(2));
    let first = formatter.formatter_for(Book::SHAPE, &["title"]).unwrap();
    formatter.formatter_for(Book::SHAPE, &["author"]).unwrap();
    // touch title so author is the oldest
    formatter.formatter_for(Book::SHAPE, &["title"]).unwrap();
    formatter.formatter_for(Book::SHAPE, &["year"]).unwrap();

    let stats = formatter.stats();
    assert_eq!(stats.formatters, 2);
    assert_eq!(stats.evictions, 1);

    // title survived, author has to be rebuilt
    let again = formatter.formatter_for(Book::SHAPE, &["title"]).unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    formatter.formatter_for(Book::SHAPE, &["author"]).unwrap();
    let stats = formatter.stats();
    assert_eq!(stats.formatter_compiles, 4);
    assert_eq!(stats.evictions, 2);
}

#[test]
fn formatter_capacity_applies_per_type() {
    let formatter = SparseFormatter::with_config(SparseConfig::new().formatter_capacity(1));
    formatter.format(&book(), &["title"]).unwrap();
    formatter.format(&film(), &["title"]).unwrap();
    let stats = formatter.stats();
    assert_eq!(stats.formatters, 2);
    assert_eq!(stats.evictions, 0);
}

#[test]
fn builder_capacity_evicts_whole_types() {
    let formatter = SparseFormatter::with_config(SparseConfig::new().builder_capacity(1));
    formatter.format(&book(), &["title"]).unwrap();
    formatter.format(&film(), &["title"]).unwrap();

    let stats = formatter.stats();
    assert_eq!(stats.builders, 1);
    assert_eq!(stats.formatters, 1);
    assert_eq!(stats.evictions, 1);

    formatter.format(&book(), &["title"]).unwrap();
    assert_eq!(formatter.stats().builder_compiles, 3);
}
