// SPDX-License-Identifier: Apache-2.0

pub mod exporters;
pub mod init;
pub mod queue;
pub mod record;
pub mod receivers;
pub mod scope;
pub mod telemetry;
