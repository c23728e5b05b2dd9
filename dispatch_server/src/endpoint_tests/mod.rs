mod admin;
mod deliveries;
mod helpers;
mod mocks;
mod webhook;
