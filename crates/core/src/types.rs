/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// Tenants are referenced by their BIGINT id; every row in this subsystem
/// carries one.
pub type TenantId = DbId;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
