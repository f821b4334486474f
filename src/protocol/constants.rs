//! MySQL protocol constants

/// Handshake protocol version sent in every greeting
pub const PROTOCOL_VERSION: u8 = 10;

/// Largest payload a single packet can carry
pub const MAX_PAYLOAD_LEN: usize = 0x00FF_FFFF;

/// Length of the authentication scramble
pub const SCRAMBLE_LEN: usize = 20;

/// Capability flags
pub mod capability {
    /// Use the improved version of old password authentication
    pub const LONG_PASSWORD: u32 = 0x0000_0001;
    /// Send found rows instead of affected rows
    pub const FOUND_ROWS: u32 = 0x0000_0002;
    /// Longer flags in column definitions
    pub const LONG_FLAG: u32 = 0x0000_0004;
    /// Database name can be given in the handshake response
    pub const CONNECT_WITH_DB: u32 = 0x0000_0008;
    /// Don't allow database.table.column
    pub const NO_SCHEMA: u32 = 0x0000_0010;
    /// Compressed packet framing
    pub const COMPRESS: u32 = 0x0000_0020;
    /// ODBC client
    pub const ODBC: u32 = 0x0000_0040;
    /// LOAD DATA LOCAL
    pub const LOCAL_FILES: u32 = 0x0000_0080;
    /// Ignore spaces before '('
    pub const IGNORE_SPACE: u32 = 0x0000_0100;
    /// 4.1 protocol
    pub const PROTOCOL_41: u32 = 0x0000_0200;
    /// Interactive client
    pub const INTERACTIVE: u32 = 0x0000_0400;
    /// Switch to TLS after the handshake
    pub const SSL: u32 = 0x0000_0800;
    /// Ignore SIGPIPE
    pub const IGNORE_SIGPIPE: u32 = 0x0000_1000;
    /// Transaction status flags in OK packets
    pub const TRANSACTIONS: u32 = 0x0000_2000;
    /// Old 4.1 protocol flag
    pub const RESERVED: u32 = 0x0000_4000;
    /// 4.1 authentication
    pub const SECURE_CONNECTION: u32 = 0x0000_8000;
    /// Multiple statements per COM_QUERY
    pub const MULTI_STATEMENTS: u32 = 0x0001_0000;
    /// Multiple result sets
    pub const MULTI_RESULTS: u32 = 0x0002_0000;
    /// Multiple result sets from prepared statements
    pub const PS_MULTI_RESULTS: u32 = 0x0004_0000;
    /// Pluggable authentication
    pub const PLUGIN_AUTH: u32 = 0x0008_0000;
    /// Connection attributes
    pub const CONNECT_ATTRS: u32 = 0x0010_0000;
    /// Length-encoded auth response
    pub const PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 0x0020_0000;
    /// Expired password sandbox mode
    pub const CAN_HANDLE_EXPIRED_PASSWORDS: u32 = 0x0040_0000;
    /// Session state tracking
    pub const SESSION_TRACK: u32 = 0x0080_0000;
    /// OK packet instead of EOF after result sets
    pub const DEPRECATE_EOF: u32 = 0x0100_0000;

    /// Every flag modeled by the mock greeting (bits 0..=23)
    pub const ALL_MODELED: u32 = 0x00FF_FFFF;
}

/// Command bytes
pub mod command {
    /// Close the connection
    pub const COM_QUIT: u8 = 0x01;
    /// Change default schema
    pub const COM_INIT_DB: u8 = 0x02;
    /// Text protocol query
    pub const COM_QUERY: u8 = 0x03;
    /// Liveness check
    pub const COM_PING: u8 = 0x0e;
    /// Prepare a statement
    pub const COM_STMT_PREPARE: u8 = 0x16;
    /// Execute a prepared statement
    pub const COM_STMT_EXECUTE: u8 = 0x17;
    /// Deallocate a prepared statement
    pub const COM_STMT_CLOSE: u8 = 0x19;
    /// Reset session state
    pub const COM_RESET_CONNECTION: u8 = 0x1f;
}

/// First payload byte of generic response packets
pub mod header {
    /// OK packet
    pub const OK: u8 = 0x00;
    /// EOF packet (payload shorter than 9 bytes)
    pub const EOF: u8 = 0xfe;
    /// Error packet
    pub const ERR: u8 = 0xff;
    /// LOCAL INFILE request
    pub const LOCAL_INFILE: u8 = 0xfb;
    /// Auth switch request (during authentication)
    pub const AUTH_SWITCH: u8 = 0xfe;
    /// Extra auth data (during authentication)
    pub const AUTH_MORE_DATA: u8 = 0x01;
}

/// Server status flags
pub mod status {
    /// Transaction active
    pub const IN_TRANS: u16 = 0x0001;
    /// Autocommit enabled
    pub const AUTOCOMMIT: u16 = 0x0002;
    /// Another result set follows
    pub const MORE_RESULTS_EXISTS: u16 = 0x0008;
}

/// Column types
pub mod column_type {
    pub const DECIMAL: u8 = 0x00;
    pub const TINY: u8 = 0x01;
    pub const SHORT: u8 = 0x02;
    pub const LONG: u8 = 0x03;
    pub const FLOAT: u8 = 0x04;
    pub const DOUBLE: u8 = 0x05;
    pub const NULL: u8 = 0x06;
    pub const TIMESTAMP: u8 = 0x07;
    pub const LONGLONG: u8 = 0x08;
    pub const INT24: u8 = 0x09;
    pub const DATE: u8 = 0x0a;
    pub const TIME: u8 = 0x0b;
    pub const DATETIME: u8 = 0x0c;
    pub const YEAR: u8 = 0x0d;
    pub const NEWDATE: u8 = 0x0e;
    pub const VARCHAR: u8 = 0x0f;
    pub const BIT: u8 = 0x10;
    pub const JSON: u8 = 0xf5;
    pub const NEWDECIMAL: u8 = 0xf6;
    pub const ENUM: u8 = 0xf7;
    pub const SET: u8 = 0xf8;
    pub const TINY_BLOB: u8 = 0xf9;
    pub const MEDIUM_BLOB: u8 = 0xfa;
    pub const LONG_BLOB: u8 = 0xfb;
    pub const BLOB: u8 = 0xfc;
    pub const VAR_STRING: u8 = 0xfd;
    pub const STRING: u8 = 0xfe;
    pub const GEOMETRY: u8 = 0xff;
}

/// Column definition flags
pub mod column_flag {
    /// Column cannot be NULL
    pub const NOT_NULL: u16 = 0x0001;
    /// Column is unsigned
    pub const UNSIGNED: u16 = 0x0020;
    /// Column holds binary data
    pub const BINARY: u16 = 0x0080;
}

/// Collation ids
pub mod charset {
    /// latin1_swedish_ci (the greeting charset of the mock server)
    pub const LATIN1_SWEDISH_CI: u8 = 8;
    /// utf8mb3_general_ci
    pub const UTF8_GENERAL_CI: u8 = 33;
    /// binary
    pub const BINARY: u8 = 63;
    /// utf8mb4_general_ci
    pub const UTF8MB4_GENERAL_CI: u8 = 45;
    /// utf8mb4_unicode_ci
    pub const UTF8MB4_UNICODE_CI: u8 = 224;
    /// utf8mb4_0900_ai_ci
    pub const UTF8MB4_0900_AI_CI: u8 = 255;

    /// Look up a collation id by name (case insensitive)
    pub fn by_name(name: &str) -> Option<u8> {
        match name.to_ascii_uppercase().as_str() {
            "LATIN1_SWEDISH_CI" => Some(LATIN1_SWEDISH_CI),
            "UTF8_GENERAL_CI" | "UTF8MB3_GENERAL_CI" => Some(UTF8_GENERAL_CI),
            "BINARY" => Some(BINARY),
            "UTF8MB4_GENERAL_CI" => Some(UTF8MB4_GENERAL_CI),
            "UTF8MB4_UNICODE_CI" => Some(UTF8MB4_UNICODE_CI),
            "UTF8MB4_0900_AI_CI" => Some(UTF8MB4_0900_AI_CI),
            _ => None,
        }
    }

    /// Name of a known collation id
    pub fn name(id: u8) -> Option<&'static str> {
        match id {
            LATIN1_SWEDISH_CI => Some("LATIN1_SWEDISH_CI"),
            UTF8_GENERAL_CI => Some("UTF8_GENERAL_CI"),
            BINARY => Some("BINARY"),
            UTF8MB4_GENERAL_CI => Some("UTF8MB4_GENERAL_CI"),
            UTF8MB4_UNICODE_CI => Some("UTF8MB4_UNICODE_CI"),
            UTF8MB4_0900_AI_CI => Some("UTF8MB4_0900_AI_CI"),
            _ => None,
        }
    }
}

/// Authentication plugin names
pub mod auth_plugin {
    /// SHA1 based scramble
    pub const NATIVE_PASSWORD: &str = "mysql_native_password";
    /// SHA256 based scramble
    pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";
    /// Plain text (only over TLS)
    pub const CLEAR_PASSWORD: &str = "mysql_clear_password";
}

/// Server error numbers
pub mod server_error {
    pub const ER_CON_COUNT_ERROR: u16 = 1040;
    pub const ER_DBACCESS_DENIED_ERROR: u16 = 1044;
    pub const ER_ACCESS_DENIED_ERROR: u16 = 1045;
    pub const ER_BAD_DB_ERROR: u16 = 1049;
    pub const ER_SERVER_SHUTDOWN: u16 = 1053;
    pub const ER_PARSE_ERROR: u16 = 1064;
    pub const ER_UNKNOWN_COM_ERROR: u16 = 1047;
    pub const ER_NO_SUCH_TABLE: u16 = 1146;
    pub const ER_HOST_NOT_PRIVILEGED: u16 = 1130;
    pub const ER_NOT_SUPPORTED_AUTH_MODE: u16 = 1251;
    pub const ER_QUERY_INTERRUPTED: u16 = 1317;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charset_lookup() {
        assert_eq!(charset::by_name("utf8mb4_unicode_ci"), Some(224));
        assert_eq!(charset::name(8), Some("LATIN1_SWEDISH_CI"));
        assert_eq!(charset::by_name("klingon"), None);
    }

    #[test]
    fn test_modeled_mask_covers_deprecate_eof_boundary() {
        assert_eq!(capability::ALL_MODELED & capability::DEPRECATE_EOF, 0);
        assert_ne!(capability::ALL_MODELED & capability::SESSION_TRACK, 0);
    }
}
