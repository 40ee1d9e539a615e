// Inspection of resolved torrents: playable file selection and content types.

pub mod selector;
