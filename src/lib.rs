//! # SyncHub
//!
//! Ingests employee records from heterogeneous HR sources, reconciles their
//! field names into one unified schema, and persists the result keyed by
//! `employee_id`. A model-backed query agent answers natural-language
//! questions over the stored rows.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────┐   ┌──────────┐
//! │   Loaders    │──▶│ Field mapper │──▶│ Normalizer │──▶│  SQLite  │
//! │ SAP/WD/CSV   │   │ (model+cache)│   │            │   │ employees│
//! └──────────────┘   └──────────────┘   └────────────┘   └────┬─────┘
//!                                                             │
//!                      ┌──────────────────────────────────────┤
//!                      ▼                                      ▼
//!                 ┌──────────┐                          ┌───────────┐
//!                 │   CLI    │                          │   HTTP    │
//!                 │(synchub) │                          │  (axum)   │
//!                 └──────────┘                          └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! synchub init                         # create database
//! synchub sync all                     # map + upsert every built-in source
//! synchub import staff.csv --source Acme
//! synchub ask "How many employees are in Engineering?"
//! synchub serve                        # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Unified schema and record types |
//! | [`loaders`] | Source loader trait and registry |
//! | [`loader_static`] | Built-in mock HR sources |
//! | [`loader_csv`] | CSV-backed loader |
//! | [`llm`] | Generative model providers |
//! | [`mapper`] | Field-mapping inference, cache, fallbacks |
//! | [`normalize`] | Raw record → unified employee |
//! | [`store`] | Employee upsert and listing |
//! | [`query_log`] | Answered-question log |
//! | [`agent`] | Natural-language query agent |
//! | [`ingest`] | Sync pipeline orchestration |
//! | [`sources`] | Connected-source markers |
//! | [`stats`] | Aggregate counts |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod loader_csv;
pub mod loader_static;
pub mod loaders;
pub mod mapper;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod query_log;
pub mod server;
pub mod sources;
pub mod stats;
pub mod store;
