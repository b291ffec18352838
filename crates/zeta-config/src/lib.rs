// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Process-level configuration shared by the zeta tools.

pub mod defaults;
pub mod tracing;

pub use defaults::{DefaultsError, NumericDefaults};
pub use tracing::{init_tracing, InitError};
