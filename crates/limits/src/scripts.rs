//! Lua sources for the atomic primitives
//!
//! Each script is deterministic, touches only its named keys, and returns a
//! fixed-arity result so the Rust side can destructure without probing.

/// KEYS[1] = counter key
/// ARGV[1] = increment, ARGV[2] = limit, ARGV[3] = ttl seconds
///
/// Returns {allowed, count, remaining}. The TTL is set only when the key is
/// absent; a rolled-back counter sitting at 0 keeps its original TTL.
pub const COUNTER_WITH_LIMIT: &str = r#"
local cur = tonumber(redis.call('GET', KEYS[1]) or '0')
local inc = tonumber(ARGV[1])
local limit = tonumber(ARGV[2])
if cur + inc > limit then
    local remaining = limit - cur
    if remaining < 0 then remaining = 0 end
    return {0, cur, remaining}
end
if redis.call('EXISTS', KEYS[1]) == 0 then
    redis.call('SET', KEYS[1], 0, 'EX', tonumber(ARGV[3]))
end
local new = redis.call('INCRBY', KEYS[1], inc)
return {1, new, limit - new}
"#;

/// KEYS[1] = counter key
/// ARGV[1] = amount
///
/// Returns the new count. Never goes below zero; the TTL is untouched.
pub const COUNTER_ROLLBACK: &str = r#"
local cur = tonumber(redis.call('GET', KEYS[1]) or '0')
local amount = tonumber(ARGV[1])
if cur <= 0 then
    return cur
end
if amount > cur then amount = cur end
return redis.call('DECRBY', KEYS[1], amount)
"#;

/// KEYS[1] = semaphore set key
/// ARGV[1] = lease meta prefix, ARGV[2] = lease id, ARGV[3] = metadata json,
/// ARGV[4] = max leases, ARGV[5] = lease ttl seconds
///
/// Returns {acquired, active, retry_after}. Members whose metadata key has
/// expired are pruned before counting, so a crashed worker frees its slot
/// after one lease TTL. On success the set TTL is refreshed to 2x the lease
/// TTL, keeping the aggregate key alive only while leases remain.
pub const SEMAPHORE_ACQUIRE: &str = r#"
local members = redis.call('SMEMBERS', KEYS[1])
for i = 1, #members do
    if redis.call('EXISTS', ARGV[1] .. members[i]) == 0 then
        redis.call('SREM', KEYS[1], members[i])
    end
end
local count = redis.call('SCARD', KEYS[1])
local max = tonumber(ARGV[4])
local ttl = tonumber(ARGV[5])
if count >= max then
    local retry = ttl
    local live = redis.call('SMEMBERS', KEYS[1])
    for i = 1, #live do
        local t = redis.call('TTL', ARGV[1] .. live[i])
        if t > 0 and t < retry then retry = t end
    end
    return {0, count, retry}
end
redis.call('SADD', KEYS[1], ARGV[2])
redis.call('SET', ARGV[1] .. ARGV[2], ARGV[3], 'EX', ttl)
redis.call('EXPIRE', KEYS[1], 2 * ttl)
return {1, count + 1, 0}
"#;

/// KEYS[1] = semaphore set key
/// ARGV[1] = lease meta prefix, ARGV[2] = lease id
///
/// Returns {released}. Idempotent; missing leases are not an error.
pub const SEMAPHORE_RELEASE: &str = r#"
local removed = redis.call('SREM', KEYS[1], ARGV[2])
redis.call('DEL', ARGV[1] .. ARGV[2])
return {removed}
"#;

/// KEYS[1] = cooldown key
/// ARGV[1] = ttl seconds, ARGV[2] = value
///
/// Returns {set, ttl_remaining}. Sets only if absent.
pub const COOLDOWN_CHECK_AND_SET: &str = r#"
local ok = redis.call('SET', KEYS[1], ARGV[2], 'NX', 'EX', tonumber(ARGV[1]))
if ok then
    return {1, 0}
end
local ttl = redis.call('TTL', KEYS[1])
if ttl < 0 then ttl = 0 end
return {0, ttl}
"#;

/// KEYS[1] = idempotency key
/// ARGV[1] = serialized value, ARGV[2] = ttl seconds
///
/// Returns {is_first, stored_value}. First caller wins; later callers read
/// the first caller's value verbatim.
pub const IDEMPOTENCY_GET_OR_SET: &str = r#"
local existing = redis.call('GET', KEYS[1])
if existing then
    return {0, existing}
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', tonumber(ARGV[2]))
return {1, ARGV[1]}
"#;
