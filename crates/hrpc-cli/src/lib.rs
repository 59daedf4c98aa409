// Copyright 2025 hrpc Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # hrpc CLI
//!
//! Command-line interface for the hrpc protocol engine.
//!
//! ## Key Commands
//!
//! - `hrpc serve`: Host the built-in [`echo`] service on a TCP address
//! - `hrpc call`: Invoke a method whose parameters and result are strings
//!   (prints the raw result for scripting)
//!
//! ## Architecture
//!
//! The CLI uses the `argh` crate for argument parsing and maps flags onto
//! [`ServerConfig`](hrpc_common::ServerConfig) and
//! [`ClientConfig`](hrpc_common::ClientConfig). Service addresses for `call`
//! come from `-r Service=host:port` routes through a
//! [`StaticRegistry`](hrpc_common::StaticRegistry).

pub mod echo;
