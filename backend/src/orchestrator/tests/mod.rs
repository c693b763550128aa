mod test_year_loop;
