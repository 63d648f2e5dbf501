mod deploy;
mod telemetry;
