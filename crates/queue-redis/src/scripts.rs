//! Lua scripts providing the atomic multi-key operations `JobQueue` needs.
//!
//! Same technique as the teacher corpus's Redis queue
//! (`other_examples/b9ccacef_dimfeld-ergo__queues-lib.rs.rs`, one script per
//! state transition) rather than `WATCH`/`MULTI` retry loops — a single
//! `EVAL` round trip per operation, no optimistic-lock retries to reason
//! about.

pub const ENQUEUE: &str = r#"
local jobId = ARGV[1]
local sortScore = ARGV[2]
local isDelayed = ARGV[3]
local delayScore = ARGV[4]
local hasRepeat = ARGV[5]

if hasRepeat == "1" then
  if redis.call('EXISTS', KEYS[4]) == 1 then
    return redis.call('GET', KEYS[4])
  end
end

local hsetArgs = {}
for i = 6, #ARGV do
  table.insert(hsetArgs, ARGV[i])
end
redis.call('HSET', KEYS[1], unpack(hsetArgs))

if isDelayed == "1" then
  redis.call('ZADD', KEYS[3], delayScore, jobId)
else
  redis.call('ZADD', KEYS[2], sortScore, jobId)
end

if hasRepeat == "1" then
  redis.call('SET', KEYS[4], jobId)
end

return jobId
"#;

/// Promotes due delayed jobs into `waiting`, then pops the highest-priority
/// waiting job and marks it ACTIVE. Returns the job id, or `false` if the
/// queue is paused or empty.
pub const RESERVE: &str = r#"
if redis.call('EXISTS', KEYS[5]) == 1 then
  return false
end

local due = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1], 'LIMIT', 0, 200)
for i = 1, #due do
  local id = due[i]
  local jobKey = KEYS[3] .. id
  local score = redis.call('HGET', jobKey, 'sort_score')
  if score then
    redis.call('ZREM', KEYS[2], id)
    redis.call('ZADD', KEYS[1], score, id)
  end
end

local popped = redis.call('ZPOPMIN', KEYS[1], 1)
if #popped == 0 then
  return false
end
local jobId = popped[1]
local jobKey = KEYS[3] .. jobId
if redis.call('EXISTS', jobKey) == 0 then
  return false
end
redis.call('ZADD', KEYS[4], tonumber(ARGV[1]) + tonumber(ARGV[2]), jobId)
-- attemptsMade counts times reserved, not times failed (BullMQ semantics):
-- incrementing here, rather than in FAIL, is what makes a successful final
-- attempt still show up in the count (spec.md §8 property 3 / S3).
redis.call('HINCRBY', jobKey, 'attempts_made', 1)
redis.call('HSET', jobKey, 'status', 'ACTIVE', 'owner_worker_id', ARGV[3], 'started_at', ARGV[1])
return jobId
"#;

pub const ACK: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('HSET', KEYS[1], 'status', 'COMPLETED', 'return_value', ARGV[2], 'finished_at', ARGV[3])
if ARGV[4] == "0" then
  redis.call('DEL', KEYS[1])
else
  redis.call('ZADD', KEYS[3], ARGV[3], ARGV[1])
end
return 1
"#;

/// `ARGV[4] == "1"` means retry: the job goes to `delayed` scored by the
/// jittered backoff deadline, computed in Rust by `dispatch_core::backoff`
/// before this script runs. Otherwise the job terminates as FAILED.
/// `ARGV[5]` (`attempts_made`) is written back verbatim — it was already
/// bumped by `RESERVE`'s `HINCRBY`, not incremented here.
pub const FAIL: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end
redis.call('ZREM', KEYS[2], ARGV[1])
if ARGV[4] == "1" then
  redis.call('HSET', KEYS[1], 'status', 'DELAYED', 'attempts_made', ARGV[5], 'error_code', ARGV[2], 'error_message', ARGV[3])
  redis.call('ZADD', KEYS[4], ARGV[6], ARGV[1])
else
  redis.call('HSET', KEYS[1], 'status', 'FAILED', 'attempts_made', ARGV[5], 'error_code', ARGV[2], 'error_message', ARGV[3], 'finished_at', ARGV[7])
  if ARGV[8] == "0" then
    redis.call('DEL', KEYS[1])
  else
    redis.call('ZADD', KEYS[5], ARGV[7], ARGV[1])
  end
end
return 1
"#;

/// QUEUED/DELAYED jobs are removed from their wait structure and marked
/// CANCELLED outright. ACTIVE jobs are only flagged — the owning worker
/// observes `cancel_requested` cooperatively (spec.md §4.1).
pub const CANCEL: &str = r#"
local status = redis.call('HGET', KEYS[1], 'status')
if not status then
  return 0
end
if status == 'QUEUED' then
  redis.call('ZREM', KEYS[2], ARGV[1])
  redis.call('HSET', KEYS[1], 'status', 'CANCELLED')
elseif status == 'DELAYED' then
  redis.call('ZREM', KEYS[3], ARGV[1])
  redis.call('HSET', KEYS[1], 'status', 'CANCELLED')
else
  redis.call('HSET', KEYS[1], 'cancel_requested', '1')
end
return 1
"#;

/// No-op unless the job is still ACTIVE — a worker that lost its lease or
/// already failed/acked the job in the meantime must not resurrect it.
pub const RELEASE: &str = r#"
local status = redis.call('HGET', KEYS[1], 'status')
if status ~= 'ACTIVE' then
  return 0
end
redis.call('ZREM', KEYS[2], ARGV[1])
local score = redis.call('HGET', KEYS[1], 'sort_score')
redis.call('ZADD', KEYS[3], score, ARGV[1])
redis.call('HSET', KEYS[1], 'status', 'QUEUED', 'owner_worker_id', '', 'cancel_requested', '')
return 1
"#;

/// The queue-side half of restart safety (spec.md §5): any ACTIVE job
/// whose lease expired is reclaimed to WAITING, same as `RELEASE` but
/// scanning by score instead of by id.
pub const REAP_EXPIRED: &str = r#"
local expired = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1], 'LIMIT', 0, 500)
local reaped = 0
for i = 1, #expired do
  local id = expired[i]
  local jobKey = KEYS[3] .. id
  if redis.call('EXISTS', jobKey) == 1 then
    redis.call('ZREM', KEYS[2], id)
    local score = redis.call('HGET', jobKey, 'sort_score')
    redis.call('ZADD', KEYS[1], score, id)
    redis.call('HSET', jobKey, 'status', 'QUEUED', 'owner_worker_id', '', 'cancel_requested', '')
    reaped = reaped + 1
  else
    redis.call('ZREM', KEYS[2], id)
  end
end
return reaped
"#;

pub const DRAIN: &str = r#"
local removed = 0
local waitingIds = redis.call('ZRANGE', KEYS[1], 0, -1)
for i = 1, #waitingIds do
  redis.call('DEL', KEYS[3] .. waitingIds[i])
  removed = removed + 1
end
redis.call('DEL', KEYS[1])

local delayedIds = redis.call('ZRANGE', KEYS[2], 0, -1)
for i = 1, #delayedIds do
  redis.call('DEL', KEYS[3] .. delayedIds[i])
  removed = removed + 1
end
redis.call('DEL', KEYS[2])
return removed
"#;

pub const CLEAN: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
for i = 1, #ids do
  redis.call('DEL', KEYS[2] .. ids[i])
  redis.call('ZREM', KEYS[1], ids[i])
end
return #ids
"#;

/// Single-job counterpart to `RETRY_FAILED` — same reset-by-one transform,
/// scoped to one id. Returns 0 if the job is missing or not FAILED.
pub const RETRY_JOB: &str = r#"
local jobKey = KEYS[1]
local status = redis.call('HGET', jobKey, 'status')
if status ~= 'FAILED' then
  return 0
end
local score = redis.call('HGET', jobKey, 'sort_score')
local attempts = tonumber(redis.call('HGET', jobKey, 'attempts_made') or '0')
local newAttempts = attempts - 1
if newAttempts < 0 then
  newAttempts = 0
end
redis.call('HSET', jobKey, 'status', 'QUEUED', 'attempts_made', tostring(newAttempts), 'error_code', '', 'error_message', '', 'finished_at', '')
redis.call('ZADD', KEYS[3], score, ARGV[1])
redis.call('ZREM', KEYS[2], ARGV[1])
return 1
"#;

pub const RETRY_FAILED: &str = r#"
local ids = redis.call('ZRANGE', KEYS[1], 0, -1)
local moved = 0
for i = 1, #ids do
  local id = ids[i]
  local jobKey = KEYS[2] .. id
  if redis.call('EXISTS', jobKey) == 1 then
    local score = redis.call('HGET', jobKey, 'sort_score')
    local attempts = tonumber(redis.call('HGET', jobKey, 'attempts_made') or '0')
    local newAttempts = attempts - 1
    if newAttempts < 0 then
      newAttempts = 0
    end
    redis.call('HSET', jobKey, 'status', 'QUEUED', 'attempts_made', tostring(newAttempts), 'error_code', '', 'error_message', '', 'finished_at', '')
    redis.call('ZADD', KEYS[3], score, id)
    redis.call('ZREM', KEYS[1], id)
    moved = moved + 1
  end
end
return moved
"#;
