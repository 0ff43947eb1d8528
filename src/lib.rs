//! # nsdk-migrator
//!
//! A web service that helps migrate legacy NSDK 4GL applications to an
//! Angular frontend and a Spring Boot backend. It clones the legacy
//! repository, indexes its sources as embeddings, asks an LLM for a
//! migration plan per screen, and commits generated code on feature
//! branches of the target repositories.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────┐   clone / pull    ┌─────────────────────┐
//!   │ source repo  │ ────────────────▶ │ data/repositories/  │
//!   └──────────────┘                   └──────────┬──────────┘
//!                                                 │ detect + scan (regex)
//!                                                 ▼
//!                                      ┌─────────────────────┐
//!                                      │  ScannedFile list   │
//!                                      └──────────┬──────────┘
//!                                                 │ embed (bounded)
//!                                                 ▼
//!   ┌──────────────┐   top-k cosine    ┌─────────────────────┐
//!   │ NSDK screen  │ ◀──────────────── │ vector store        │
//!   │   (.SCR)     │     context       │ flat / Qdrant /     │
//!   └──────┬───────┘                   │ Chroma              │
//!          │ prompt                    └─────────────────────┘
//!          ▼
//!   ┌──────────────┐   stored plan     ┌─────────────────────┐
//!   │ LLM: JSON    │ ────────────────▶ │ SQLite (analyses)   │
//!   │ migration    │                   └──────────┬──────────┘
//!   │ plan         │                              │ generate
//!   └──────────────┘                              ▼
//!                                      ┌─────────────────────┐
//!                                      │ feature/<screen>    │
//!                                      │ frontend + backend  │
//!                                      └─────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based process settings (data dir, bind address, limits)
//! - [`models`] - Configurations, provider settings and request/response bodies
//! - [`db`] - SQLite persistence for configurations and analyses
//! - [`git`] - Clone/fast-forward, repository inspection and branch commits via libgit2
//! - [`scan`] - Technology detection and regex metadata extraction for NSDK, Angular and Spring
//! - [`llm`] - Chat and embedding calls for OpenAI, Mistral and Ollama
//! - [`vector`] - Vector store facade over a local flat index, Qdrant and Chroma
//! - [`vectorize`] - Background vectorization batches and similarity search
//! - [`analysis`] - Retrieval-augmented migration plans for NSDK screens
//! - [`docs`] - NSDK documentation chunks in a sibling collection, queried during generation
//! - [`codegen`] - Angular/Spring Boot generation committed on feature branches
//! - [`api`] - Axum HTTP handlers and router
//! - [`state`] - Shared application state

pub mod analysis;
pub mod api;
pub mod codegen;
pub mod config;
pub mod db;
pub mod docs;
pub mod git;
pub mod llm;
pub mod models;
pub mod scan;
pub mod state;
pub mod vector;
pub mod vectorize;
