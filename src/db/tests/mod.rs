mod downloaded;
mod migrations;
