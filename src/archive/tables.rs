pub const DATA_TABLE_NAME: &str = "data";

pub const DATA_TABLE: &str = "CREATE TABLE IF NOT EXISTS data (
                                date INTEGER PRIMARY KEY
                            );";

// SQLite resolves column names without regard to ASCII case
pub const COLUMN_TYPE: &str = "SELECT type
                               FROM pragma_table_info('data')
                               WHERE name = ? COLLATE NOCASE;";
