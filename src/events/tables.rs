pub const DATA_TABLE: &str = "CREATE TABLE IF NOT EXISTS data (
                                eventId INTEGER PRIMARY KEY,
                                value INTEGER,
                                tickId INTEGER
                            );";
