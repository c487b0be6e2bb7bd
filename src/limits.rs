use crate::model::{DAY_MS, Ms};

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_RESERVATIONS_PER_ROOM: usize = 50_000;

pub const MAX_ROOM_NUMBER_LEN: usize = 32;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_NOTE_LEN: usize = 4096;
pub const MAX_ACTOR_LEN: usize = 128;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

pub const MAX_STAY_MS: Ms = 366 * DAY_MS;
pub const MAX_QUERY_WINDOW_MS: Ms = 3 * 366 * DAY_MS;
