// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests that run a fake worker written as a shell script.

#![cfg(unix)]

mod basic;
mod fixtures;
