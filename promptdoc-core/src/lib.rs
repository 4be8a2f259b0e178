#![doc = "promptdoc-core: core logic library for promptdoc."]

//! This crate contains the prompt-to-document pipeline: reading prompt files,
//! generating content for every prompt under a concurrency cap, assembling the
//! results in their original order, and writing the document.
//!
//! # Usage
//! The CLI crate builds a [`config::RunConfig`], loads a
//! [`prompt_source::PromptSource`] and calls [`pipeline::execute`] with a
//! [`contract::TextBackend`] and a [`contract::DocumentWriter`].

pub mod config;
pub mod contract;
pub mod document;
pub mod generator;
pub mod markdown_to_pdf;
pub mod openai;
pub mod orchestrator;
pub mod pipeline;
pub mod prompt_source;
pub mod writer;
