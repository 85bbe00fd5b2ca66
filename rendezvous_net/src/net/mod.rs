// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Framing of [prost::Message]s over TCP streams

pub mod codec;

/// A network port
pub type NetworkPort = u16;
