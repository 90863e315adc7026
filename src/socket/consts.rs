/// Buffer size of the per-connection event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Close code sent on an orderly, user-requested disconnect.
pub const CLOSE_CODE_NORMAL: u16 = 1000;
