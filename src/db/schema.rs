pub const SCHEMA: &str = r#"
-- Configured cameras (written by the management surface, read here)
CREATE TABLE IF NOT EXISTS cameras (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL DEFAULT 'Camera',
    address TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- Detection log: one row per face per monitoring cycle
CREATE TABLE IF NOT EXISTS detections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,                      -- NULL = unrecognized person
    confidence REAL NOT NULL,
    is_known INTEGER NOT NULL,
    detected_at TEXT NOT NULL,
    camera_id INTEGER,
    FOREIGN KEY (camera_id) REFERENCES cameras (id)
);

CREATE INDEX IF NOT EXISTS idx_detections_detected_at ON detections(detected_at);
CREATE INDEX IF NOT EXISTS idx_detections_name ON detections(name);
"#;
